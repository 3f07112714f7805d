//! Filename completion for commands that take a script name argument.
//!
//! Scans a directory for files with a given extension, matching a partial
//! name case-insensitively, the way the console completes map names.

use std::path::Path;

/// Result of a completion operation.
#[derive(Debug, Default)]
pub struct CompletionResult {
    /// All matches found (sorted, deduplicated, extension stripped)
    pub matches: Vec<String>,
    /// Longest common prefix of all matches
    pub common_prefix: String,
}

/// List files in `dir` whose name starts with `partial` and ends with `ext`,
/// with the extension stripped.
pub fn scan_dir(dir: &Path, partial: &str, ext: &str) -> Vec<String> {
    let mut names = Vec::new();
    let partial_lower = partial.to_lowercase();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let fname = entry.file_name().to_string_lossy().to_string();
            let fname_lower = fname.to_lowercase();
            if fname_lower.ends_with(ext) && fname_lower.starts_with(&partial_lower) {
                names.push(fname[..fname.len() - ext.len()].to_string());
            }
        }
    }

    names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
    names.dedup();
    names
}

/// Longest prefix shared by every string, compared case-insensitively.
pub fn find_common_prefix(strings: &[String]) -> String {
    let Some(first) = strings.first() else {
        return String::new();
    };

    // shrink a prefix of the first entry against each other candidate
    let mut prefix = first.as_str();
    for candidate in &strings[1..] {
        let mut shared = 0;
        for (a, b) in prefix.chars().zip(candidate.chars()) {
            if !a.eq_ignore_ascii_case(&b) {
                break;
            }
            shared += a.len_utf8();
        }
        prefix = &prefix[..shared];
        if prefix.is_empty() {
            break;
        }
    }

    prefix.to_string()
}

/// Complete a partial script name against a directory.
pub fn complete_in_dir(dir: &Path, partial: &str, ext: &str) -> CompletionResult {
    let matches = scan_dir(dir, partial, ext);
    let common_prefix = if matches.is_empty() {
        partial.to_string()
    } else {
        find_common_prefix(&matches)
    };
    CompletionResult {
        matches,
        common_prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_common_prefix_empty() {
        assert_eq!(find_common_prefix(&[]), "");
    }

    #[test]
    fn test_find_common_prefix_single() {
        assert_eq!(find_common_prefix(&["panini".to_string()]), "panini");
    }

    #[test]
    fn test_find_common_prefix_multiple() {
        assert_eq!(
            find_common_prefix(&[
                "fisheye1".to_string(),
                "fisheye2".to_string(),
                "fit".to_string()
            ]),
            "fi"
        );
    }

    #[test]
    fn test_scan_dir() {
        let dir = std::env::temp_dir().join(format!("fisheye-scan-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("panini.lua"), "").unwrap();
        std::fs::write(dir.join("pannotia.lua"), "").unwrap();
        std::fs::write(dir.join("cube.lua"), "").unwrap();
        std::fs::write(dir.join("readme.txt"), "").unwrap();

        let result = complete_in_dir(&dir, "pan", ".lua");
        assert_eq!(result.matches, vec!["panini", "pannotia"]);
        assert_eq!(result.common_prefix, "pan");

        let all = scan_dir(&dir, "", ".lua");
        assert_eq!(all.len(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
