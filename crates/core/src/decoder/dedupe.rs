use std::collections::{HashMap, HashSet};

use super::DecodeWarning;

/// Renames later occurrences of a repeated `(numeric id, name)` identity to
/// `"{name} duplicate(N)"`, keeping the first occurrence as is. `N` skips
/// suffixes already taken by another item with the same numeric id.
///
/// Returns one warning per renamed item, in input order.
pub fn dedupe_identities<'a>(
    identities: impl IntoIterator<Item = (Option<i64>, &'a mut String)>,
) -> Vec<DecodeWarning> {
    let mut items: Vec<(Option<i64>, &'a mut String)> = identities.into_iter().collect();
    let mut taken: HashSet<(Option<i64>, String)> = items.iter().map(|(id, name)| (*id, name.to_string())).collect();
    let mut seen: HashSet<(Option<i64>, String)> = HashSet::new();
    let mut next: HashMap<(Option<i64>, String), usize> = HashMap::new();
    let mut warnings = Vec::new();

    for (numeric_id, name) in &mut items {
        let numeric_id = *numeric_id;
        let identity = (numeric_id, name.to_string());
        if seen.insert(identity.clone()) {
            continue;
        }
        let n = next.entry(identity).or_insert(1);
        let renamed = loop {
            let candidate = format!("{name} duplicate({n})");
            *n += 1;
            if !taken.contains(&(numeric_id, candidate.clone())) {
                break candidate;
            }
        };
        taken.insert((numeric_id, renamed.clone()));
        tracing::warn!(?numeric_id, name = %name, %renamed, "duplicate node identity");
        warnings.push(DecodeWarning::DuplicateIdentity {
            numeric_id,
            name: name.to_string(),
            renamed: renamed.clone(),
        });
        **name = renamed;
    }
    warnings
}
