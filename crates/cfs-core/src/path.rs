//! Slash-path normalization.
//!
//! Paths are plain strings; normalization drops `.` steps, folds `name/..`
//! pairs, and trims leading and trailing empty steps, so `a/b/c/../d`,
//! `/a/b/d` and `./a/b/d/` all resolve alike. The root is the empty step
//! list `[""]`. A `..` with nothing left to fold stays in place, which makes
//! the later lookup fail rather than escape the root.

/// Normalized steps of `path`. Never empty; the root is `[""]`.
#[must_use]
pub fn to_steps(path: &str) -> Vec<String> {
    let mut steps: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "." => {}
            ".." => {
                if matches!(steps.last(), None | Some(&"..")) {
                    steps.push(part);
                } else {
                    steps.pop();
                }
            }
            other => steps.push(other),
        }
    }

    let mut start = 0;
    while start < steps.len() && steps[start].is_empty() {
        start += 1;
    }
    let mut end = steps.len();
    while end > start && steps[end - 1].is_empty() {
        end -= 1;
    }

    if start == end {
        vec![String::new()]
    } else {
        steps[start..end].iter().map(|s| (*s).to_string()).collect()
    }
}

/// Last normalized step; `""` for the root.
#[must_use]
pub fn file_name(path: &str) -> String {
    let mut steps = to_steps(path);
    steps.pop().unwrap_or_default()
}

/// Everything before the last slash of the raw string, `""` if none.
#[must_use]
pub fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(index) => path[..index].to_string(),
        None => String::new(),
    }
}

/// `path` extended by one more step.
#[must_use]
pub fn join(path: &str, name: &str) -> String {
    let mut steps = to_steps(path);
    steps.push(name.to_string());
    steps.join("/")
}

/// Last non-empty step of `name` treated as a path; `""` when there is none.
#[must_use]
pub fn clean_name(name: &str) -> String {
    to_steps(name)
        .into_iter()
        .rev()
        .find(|step| !step.is_empty())
        .unwrap_or_default()
}

/// Whether `ancestor`'s steps are a prefix of `path`'s steps.
#[must_use]
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    let upper = to_steps(ancestor);
    let lower = to_steps(path);
    upper.len() <= lower.len() && upper == lower[..upper.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(path: &str) -> Vec<String> {
        to_steps(path)
    }

    #[test]
    fn dot_and_dotdot_fold_away() {
        let expected = vec!["a", "b", "d"];
        assert_eq!(steps("a/b/c/../d"), expected);
        assert_eq!(steps("/a/b/c/../d"), expected);
        assert_eq!(steps("./a/b/c/../d"), expected);
        assert_eq!(steps("./a/b/c/../d/"), expected);
        assert_eq!(steps("/./a/b/c/../d/"), expected);
        assert_eq!(steps("/./a/b/c/c1/../../d/"), expected);
        assert_eq!(steps("/./a/b/c2/c1/../../d/"), expected);
    }

    #[test]
    fn root_spellings_normalize_to_the_empty_step() {
        assert_eq!(steps(""), vec![""]);
        assert_eq!(steps("/"), vec![""]);
        assert_eq!(steps("."), vec![""]);
        assert_eq!(steps("./"), vec![""]);
    }

    #[test]
    fn leading_dotdot_is_retained() {
        assert_eq!(steps("../a"), vec!["..", "a"]);
        assert_eq!(steps("../../a"), vec!["..", "..", "a"]);
    }

    #[test]
    fn file_name_is_the_last_step() {
        assert_eq!(file_name("./no/no/yes"), "yes");
        assert_eq!(file_name("./yes"), "yes");
        assert_eq!(file_name("yes"), "yes");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn parent_cuts_at_the_last_raw_slash() {
        assert_eq!(parent("./yes/no"), "./yes");
        assert_eq!(parent("./yes"), ".");
        assert_eq!(parent("/yes"), "");
        assert_eq!(parent("yes"), "");
        assert_eq!(parent(""), "");
    }

    #[test]
    fn join_normalizes_the_base() {
        assert_eq!(join("./no/no/", "yes"), "no/no/yes");
        assert_eq!(join("./no/no", "yes"), "no/no/yes");
        assert_eq!(join("", "yes"), "/yes");
    }

    #[test]
    fn clean_name_takes_the_last_non_empty_step() {
        assert_eq!(clean_name("/first"), "first");
        assert_eq!(clean_name("/first/"), "first");
        assert_eq!(clean_name("first"), "first");
        assert_eq!(clean_name(""), "");
        assert_eq!(clean_name("/"), "");
    }

    #[test]
    fn ancestry_is_a_step_prefix_check() {
        assert!(is_ancestor("./first", "./first/second/third"));
        assert!(is_ancestor("./first", "/first/second/third"));
        assert!(is_ancestor("/first", "./first/second/third"));
        assert!(is_ancestor("first", "/first/second/third"));
        assert!(is_ancestor("first", "first/second/./third"));
        assert!(is_ancestor("first/./", "first/second/./third"));
        assert!(is_ancestor("././first/././", "first/second/./third"));
        assert!(is_ancestor("", "."));

        assert!(!is_ancestor("first/second", "first"));
        assert!(!is_ancestor("second", "first/second"));
    }
}
