//! stencil CLI - Command-line interface for typed templates
//!
//! Usage:
//!   stencil check job.yaml --schema job.json --env prod.yaml
//!   stencil interpolate job.yaml --schema job.json --bind region=us-east-1
//!   stencil resolve "{{user}}@{{host}}" --bind user=root --bind host=db
//!   stencil schema types job.json

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stencil_core::registry;
use stencil_core::{Environment, Object, Ref, Schema, Scope, Type, Value};

/// stencil - Typed template interpolation and schema checking
#[derive(Parser)]
#[command(name = "stencil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type check values against a type descriptor
    Check {
        /// Value file(s), merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Path to the type descriptor file
        #[arg(short, long)]
        schema: PathBuf,

        /// Named type within the descriptor to check against (default: the root type)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Environment file(s) to bind, later files take precedence
        #[arg(short, long)]
        env: Vec<PathBuf>,

        /// Bind a single reference, e.g. --bind region=us-east-1
        #[arg(short, long)]
        bind: Vec<String>,

        /// Reject keys the schema does not declare
        #[arg(long)]
        strict: bool,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Only output errors (quiet mode)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print values with every resolvable placeholder substituted
    Interpolate {
        /// Value file(s), merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Path to the type descriptor file
        #[arg(short, long)]
        schema: PathBuf,

        /// Named type within the descriptor (default: the root type)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Environment file(s) to bind, later files take precedence
        #[arg(short, long)]
        env: Vec<PathBuf>,

        /// Bind a single reference, e.g. --bind region=us-east-1
        #[arg(short, long)]
        bind: Vec<String>,

        /// Reject keys the schema does not declare
        #[arg(long)]
        strict: bool,

        /// Output format: yaml, json
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Resolve a bare template string
    Resolve {
        /// Template text, e.g. "{{user}}@{{host}}"
        template: String,

        /// Environment file(s) to bind, later files take precedence
        #[arg(short, long)]
        env: Vec<PathBuf>,

        /// Bind a single reference, e.g. --bind user=root
        #[arg(short, long)]
        bind: Vec<String>,
    },

    /// Type descriptor utilities
    #[command(name = "schema")]
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Validate a type descriptor file
    Validate {
        /// Descriptor file to validate
        #[arg(required = true)]
        file: PathBuf,
    },

    /// List the named types a descriptor defines
    Types {
        /// Descriptor file
        #[arg(required = true)]
        file: PathBuf,
    },
}

/// Run the CLI with the given arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            files,
            schema,
            type_name,
            env,
            bind,
            strict,
            format,
            quiet,
        } => {
            let inputs = Inputs {
                files,
                schema,
                type_name,
                env,
                bind,
                strict,
            };
            cmd_check(&inputs, &format, quiet)
        }

        Commands::Interpolate {
            files,
            schema,
            type_name,
            env,
            bind,
            strict,
            format,
        } => {
            let inputs = Inputs {
                files,
                schema,
                type_name,
                env,
                bind,
                strict,
            };
            cmd_interpolate(&inputs, &format)
        }

        Commands::Resolve {
            template,
            env,
            bind,
        } => cmd_resolve(&template, &env, &bind),

        Commands::Schema { command } => match command {
            SchemaCommands::Validate { file } => cmd_schema_validate(&file),
            SchemaCommands::Types { file } => cmd_schema_types(&file),
        },
    }
}

/// Arguments shared by commands that build a typed object
struct Inputs {
    files: Vec<PathBuf>,
    schema: PathBuf,
    type_name: Option<String>,
    env: Vec<PathBuf>,
    bind: Vec<String>,
    strict: bool,
}

fn read_document(path: &Path) -> Result<Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Value::from_json(&content),
        _ => Value::from_yaml(&content),
    };
    parsed.map_err(|e| format!("Failed to load {}: {}", path.display(), e))
}

fn load_values(files: &[PathBuf]) -> Result<Value, String> {
    let (first, rest) = files
        .split_first()
        .ok_or_else(|| "No value files specified".to_string())?;

    let mut values = read_document(first)?;
    for file in rest {
        values.merge(read_document(file)?);
    }
    Ok(values)
}

fn load_type(schema: &Path, type_name: Option<&str>) -> Result<Type, String> {
    let fail = |e: stencil_core::Error| format!("Failed to load schema {}: {}", schema.display(), e);
    let descriptor = registry::read_descriptor(schema).map_err(fail)?;

    let Some(name) = type_name else {
        return registry::reify(&descriptor).map_err(fail);
    };
    let namespace = registry::load(&descriptor).map_err(fail)?;
    namespace.get(name).cloned().ok_or_else(|| {
        let known: Vec<&str> = namespace.keys().map(String::as_str).collect();
        format!(
            "Type '{}' is not defined in {} (known types: {})",
            name,
            schema.display(),
            known.join(", ")
        )
    })
}

/// Parse a `key=value` binding
fn parse_binding(binding: &str) -> Result<(Ref, String), String> {
    let (key, value) = binding
        .split_once('=')
        .ok_or_else(|| format!("Invalid binding '{}': expected key=value", binding))?;
    let key = Ref::parse(key.trim()).map_err(|e| format!("Invalid binding '{}': {}", binding, e))?;
    Ok((key, value.to_string()))
}

fn load_scopes(env_files: &[PathBuf], bindings: &[String]) -> Result<Vec<Scope>, String> {
    let mut scopes = Vec::with_capacity(env_files.len() + 1);
    for file in env_files {
        let env = Environment::from_value(&read_document(file)?)
            .map_err(|e| format!("Failed to load environment {}: {}", file.display(), e))?;
        scopes.push(Scope::from(env));
    }

    if !bindings.is_empty() {
        let pairs = bindings
            .iter()
            .map(|b| parse_binding(b).map(|(key, value)| (key.address(), value)))
            .collect::<Result<Vec<_>, String>>()?;
        let env = Environment::from_entries(pairs).map_err(|e| e.to_string())?;
        scopes.push(Scope::from(env));
    }
    Ok(scopes)
}

/// Load everything and construct the bound object
///
/// The outer error is a load failure; the inner one a construction failure.
fn build(inputs: &Inputs) -> Result<Result<Object, stencil_core::Error>, String> {
    let ty = load_type(&inputs.schema, inputs.type_name.as_deref())?;
    let values = load_values(&inputs.files)?;
    let scopes = load_scopes(&inputs.env, &inputs.bind)?;

    let values = if inputs.strict { values } else { ty.prune(&values) };
    Ok(ty.construct(values).map(|obj| obj.bind_all(scopes)))
}

fn file_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| f.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn cmd_check(inputs: &Inputs, format: &str, quiet: bool) -> ExitCode {
    let built = match build(inputs) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let failure = match built {
        Ok(obj) => {
            let check = obj.check();
            if check.ok() {
                None
            } else {
                Some(check.message().to_string())
            }
        }
        Err(e) => Some(e.to_string()),
    };

    match failure {
        None => {
            if !quiet {
                if format == "json" {
                    println!("{{\"valid\": true}}");
                } else {
                    println!("{} {} is valid", "✓".green(), file_list(&inputs.files));
                }
            }
            ExitCode::SUCCESS
        }
        Some(message) => {
            if format == "json" {
                let json = serde_json::json!({
                    "valid": false,
                    "error": message
                });
                match serde_json::to_string_pretty(&json) {
                    Ok(s) => println!("{}", s),
                    Err(e) => eprintln!("{}: {}", "Error".red(), e),
                }
            } else {
                eprintln!("{} Validation failed\n", "✗".red());
                eprintln!("{}", message);
            }
            ExitCode::from(1)
        }
    }
}

fn render_value(value: &Value, format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        other => Err(format!("Unsupported format: {}. Use yaml or json.", other)),
    }
}

fn report_unbound(refs: &[Ref]) {
    if refs.is_empty() {
        return;
    }
    let names: Vec<String> = refs.iter().map(Ref::placeholder).collect();
    eprintln!("{} Unresolved references: {}", "!".yellow(), names.join(" "));
}

fn cmd_interpolate(inputs: &Inputs, format: &str) -> ExitCode {
    let obj = match build(inputs) {
        Ok(Ok(obj)) => obj,
        Ok(Err(e)) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(1);
        }
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let (resolved, unbound) = match obj.interpolate() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(1);
        }
    };

    match render_value(&resolved.to_value(), format) {
        Ok(content) => {
            print!("{}", content);
            report_unbound(&unbound);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn cmd_resolve(template: &str, env: &[PathBuf], bind: &[String]) -> ExitCode {
    let scopes = match load_scopes(env, bind) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let result = Type::string()
        .construct(template)
        .and_then(|obj| obj.bind_all(scopes).interpolate());

    match result {
        Ok((resolved, unbound)) => {
            println!("{}", resolved);
            report_unbound(&unbound);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn cmd_schema_validate(file: &Path) -> ExitCode {
    let descriptor = match read_document(file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let errors = Schema::descriptor().validate_collect(&descriptor);
    if !errors.is_empty() {
        eprintln!("{} {}: invalid type descriptor\n", "✗".red(), file.display());
        for error in errors {
            eprintln!("  {}", error);
        }
        return ExitCode::from(1);
    }

    match registry::reify(&descriptor) {
        Ok(ty) => {
            println!(
                "{} {}: valid type descriptor ({})",
                "✓".green(),
                file.display(),
                ty.name()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red(), file.display(), e);
            ExitCode::from(1)
        }
    }
}

fn cmd_schema_types(file: &Path) -> ExitCode {
    match registry::load_file(file) {
        Ok(namespace) => {
            for (name, ty) in &namespace {
                println!("{} ({})", name, ty.tag());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            ExitCode::from(2)
        }
    }
}
