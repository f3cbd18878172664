//! Wildcard matching of column names

/// Returns true if `name` matches the wildcard `pattern`
///
/// `*` splits the pattern into fragments that must all occur in `name` in
/// the given order. Matching ignores ASCII and Unicode case, and surrounding
/// whitespace in the pattern. An empty pattern matches nothing.
#[must_use]
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return false;
    }
    let name = name.to_uppercase();
    let mut rest = name.as_str();
    for fragment in pattern.to_uppercase().split('*').filter(|f| !f.is_empty()) {
        match rest.find(fragment) {
            Some(pos) => rest = &rest[pos + fragment.len()..],
            None => return false,
        }
    }
    true
}

/// Names from `names` matching any of `patterns`, without duplicates
///
/// Order follows `names`, not the pattern list.
pub fn matching_columns<'a, I, S>(names: I, patterns: &[S]) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter(|name| patterns.iter().any(|p| matches_pattern(name, p.as_ref())))
        .map(str::to_string)
        .collect()
}
