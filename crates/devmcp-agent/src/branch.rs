//! Branch-name slug generation and parsing (spec.md §1 "branch management",
//! §8 "Branch name round-trip"). Pure helpers, no I/O — grounded on C10's
//! (`search.rs`) pure-function style for string processing.

/// Cap on the slug portion of a generated branch name, in bytes.
const MAX_SLUG_BYTES: usize = 48;

/// Lowercase `title`, collapse runs of non-alphanumeric characters to a
/// single `-`, and trim leading/trailing `-`. Truncates to
/// [`MAX_SLUG_BYTES`] at a char boundary so the result is never split
/// mid-codepoint.
fn slugify_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_dash = true; // suppresses a leading dash
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.len() > MAX_SLUG_BYTES {
        let mut end = MAX_SLUG_BYTES;
        while !slug.is_char_boundary(end) {
            end -= 1;
        }
        slug.truncate(end);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Build a branch name of the form `issue-<n>-<slug(title)>` for issue
/// `issue_number` titled `title`. Falls back to `issue-<n>` if the title
/// slugifies to nothing (e.g. an all-punctuation title).
pub fn branch_name(issue_number: u64, title: &str) -> String {
    let slug = slugify_title(title);
    if slug.is_empty() {
        format!("issue-{issue_number}")
    } else {
        format!("issue-{issue_number}-{slug}")
    }
}

/// Recover the issue number from a branch name produced by [`branch_name`].
/// Returns `None` if `name` doesn't start with `issue-<digits>`.
pub fn parse_issue_number(name: &str) -> Option<u64> {
    let rest = name.strip_prefix("issue-")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_round_trips_issue_number() {
        for (n, title) in [
            (1u64, "Fix the login bug"),
            (42, "Add support for --verbose flag"),
            (1000, "Refactor: split up the parser (again)"),
        ] {
            let name = branch_name(n, title);
            assert_eq!(parse_issue_number(&name), Some(n), "branch name was {name:?}");
        }
    }

    #[test]
    fn branch_name_slugifies_punctuation_and_case() {
        assert_eq!(branch_name(7, "Fix: the Login Bug!!"), "issue-7-fix-the-login-bug");
    }

    #[test]
    fn branch_name_falls_back_when_title_has_no_slug_content() {
        assert_eq!(branch_name(3, "!!!"), "issue-3");
        assert_eq!(parse_issue_number("issue-3"), Some(3));
    }

    #[test]
    fn branch_name_truncates_long_titles_without_splitting_a_char() {
        let title = "a".repeat(200);
        let name = branch_name(5, &title);
        assert!(name.len() <= "issue-5-".len() + MAX_SLUG_BYTES);
        assert_eq!(parse_issue_number(&name), Some(5));
    }

    #[test]
    fn parse_issue_number_rejects_unrelated_strings() {
        assert_eq!(parse_issue_number("main"), None);
        assert_eq!(parse_issue_number("issue-"), None);
        assert_eq!(parse_issue_number("feature/issue-9"), None);
    }
}
