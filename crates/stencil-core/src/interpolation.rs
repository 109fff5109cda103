//! Placeholder parsing and resolution
//!
//! Templates embed references in mustache form:
//! - `{{a.b[c]}}` - a live reference, resolved against the scope chain
//! - `{{&a.b}}` - an escaped reference, kept verbatim through resolution and
//!   emitted as the literal text `{{a.b}}` on the final pass
//!
//! Resolution substitutes repeatedly until no further progress is possible,
//! bounded by [`MAX_ITERATIONS`].

use std::cell::Cell;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::naming::{Namable, Ref};

/// Escape marker that defers a placeholder
pub const ADDRESS_DELIMITER: char = '&';

/// Upper bound on substitution passes in [`resolve`]
pub const MAX_ITERATIONS: usize = 100;

/// Upper bound on nested renders of found values
pub const MAX_DEPTH: usize = 64;

fn mustache_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(&)?([^{}]+?)\}\}").expect("mustache pattern is valid"))
}

/// A piece of a split template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Literal text
    Literal(String),
    /// A reference awaiting resolution
    Ref(Ref),
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Literal(s) => write!(f, "{}", s),
            Fragment::Ref(r) => write!(f, "{}", r.placeholder()),
        }
    }
}

/// Check whether text contains any placeholder, escaped or not
pub fn contains_placeholder(text: &str) -> bool {
    mustache_re().is_match(text)
}

/// Split text into literal and reference fragments
///
/// Escaped placeholders stay as literal `{{&name}}` text, or become
/// `{{name}}` when `downcast` is set. Adjacent literals are merged.
pub fn split(text: &str, downcast: bool) -> Result<Vec<Fragment>> {
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut last = 0;

    for caps in mustache_re().captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        literal.push_str(&text[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            let address = body.as_str().trim_end_matches(ADDRESS_DELIMITER);
            if downcast {
                literal.push_str(&format!("{{{{{}}}}}", address));
            } else {
                literal.push_str(&format!("{{{{{}{}}}}}", ADDRESS_DELIMITER, address));
            }
        } else {
            if !literal.is_empty() {
                fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
            }
            fragments.push(Fragment::Ref(Ref::parse(body.as_str())?));
        }
    }
    literal.push_str(&text[last..]);
    if !literal.is_empty() {
        fragments.push(Fragment::Literal(literal));
    }

    Ok(fragments)
}

/// The references in a fragment list, in order
pub fn refs(fragments: &[Fragment]) -> Vec<Ref> {
    fragments
        .iter()
        .filter_map(|f| match f {
            Fragment::Ref(r) => Some(r.clone()),
            Fragment::Literal(_) => None,
        })
        .collect()
}

/// Substitute each reference from the first namable that can find it
///
/// Returns the joined text and the references no namable could find; those
/// stay in the text in their `{{address}}` form.
pub fn join<N: Namable>(fragments: &[Fragment], namables: &[N]) -> Result<(String, Vec<Ref>)> {
    let mut joined = String::new();
    let mut unbound = Vec::new();

    'fragments: for fragment in fragments {
        let reference = match fragment {
            Fragment::Literal(s) => {
                joined.push_str(s);
                continue;
            }
            Fragment::Ref(r) => r,
        };
        for namable in namables {
            match namable.find(reference) {
                Ok(binding) => {
                    joined.push_str(&nested(|| binding.render())?);
                    continue 'fragments;
                }
                Err(e) if e.is_lookup() => continue,
                Err(e) => return Err(e),
            }
        }
        joined.push_str(&reference.placeholder());
        unbound.push(reference.clone());
    }

    Ok((joined, unbound))
}

/// Resolve a template to a fixpoint against the namables
///
/// Returns the final text (escaped placeholders downcast to `{{name}}`) and
/// the references still unbound.
pub fn resolve<N: Namable>(text: &str, namables: &[N]) -> Result<(String, Vec<Ref>)> {
    let mut stream = text.to_string();
    let mut converged = false;

    for iteration in 0..MAX_ITERATIONS {
        let fragments = split(&stream, false)?;
        let before = refs(&fragments);
        let (joined, unbound) = join(&fragments, namables)?;
        log::trace!(
            "resolve pass {}: {} refs, {} unbound",
            iteration,
            before.len(),
            unbound.len()
        );
        stream = joined;
        if unbound == before {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(Error::uninterpolatable(format!(
            "Unable to interpolate {}! Maximum replacements reached.",
            stream
        )));
    }

    let fragments = split(&stream, true)?;
    let (joined, _) = join(&fragments, namables)?;
    Ok((joined, refs(&fragments)))
}

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Run `f` one render level deeper, failing past [`MAX_DEPTH`]
pub(crate) fn nested<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let depth = DEPTH.with(|d| {
        let next = d.get() + 1;
        d.set(next);
        next
    });
    let _guard = DepthGuard;
    if depth > MAX_DEPTH {
        return Err(Error::uninterpolatable(format!(
            "Maximum render depth {} exceeded; a value refers to itself",
            MAX_DEPTH
        )));
    }
    f()
}
