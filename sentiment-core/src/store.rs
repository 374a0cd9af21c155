//! JSON persistence of the search envelope between pipeline stages.

use crate::{CoreError, SearchParameters, SearchResults};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SUMMARIZED_SUFFIX: &str = "_summarized";

/// Lower-cases the term and replaces anything that is not alphanumeric with `_`.
pub fn slugify(term: &str) -> String {
    let slug: String = term
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "search".to_string()
    } else {
        slug
    }
}

/// Lower-cased term usable as a single directory name: separators become `_` and
/// leading dots are dropped, so the folder always stays under the output directory.
fn term_folder(term: &str) -> String {
    let folder: String = term
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let folder = folder.trim_start_matches('.').trim();
    if folder.is_empty() {
        "search".to_string()
    } else {
        folder.to_string()
    }
}

/// `{output_dir}/{term}/reddit_{slug}_{time_filter}_{sort}.json`
pub fn search_output_path(output_dir: &Path, params: &SearchParameters) -> PathBuf {
    output_dir.join(term_folder(&params.search_term)).join(format!(
        "reddit_{}_{}_{}.json",
        slugify(&params.search_term),
        params.time_filter,
        params.sort
    ))
}

/// Sibling path carrying the `_summarized` suffix.
pub fn summarized_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    input.with_file_name(format!("{}{}.json", stem, SUMMARIZED_SUFFIX))
}

pub fn load_results(path: &Path) -> Result<SearchResults, CoreError> {
    if !path.is_file() {
        return Err(CoreError::NotFound {
            resource: path.display().to_string(),
        });
    }
    let contents = fs::read_to_string(path)?;
    let results = serde_json::from_str(&contents)?;
    Ok(results)
}

pub fn save_results(path: &Path, results: &SearchResults) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(results)?;
    fs::write(path, json)?;
    info!("Data saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SearchMetadata, SortMode, TimeFilter};

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Google stock"), "google_stock");
        assert_eq!(slugify("  $GOOGL!  "), "_googl_");
        assert_eq!(slugify(""), "search");
    }

    #[test]
    fn test_search_output_path() {
        let params = SearchParameters {
            search_term: "Google stock".to_string(),
            time_filter: TimeFilter::Day,
            sort: SortMode::Hot,
            ..Default::default()
        };
        let path = search_output_path(Path::new("results"), &params);
        assert_eq!(
            path,
            PathBuf::from("results/google stock/reddit_google_stock_day_hot.json")
        );
    }

    #[test]
    fn test_search_path_stays_inside_output_dir() {
        let params = SearchParameters {
            search_term: "../../etc/Passwd".to_string(),
            ..SearchParameters::default()
        };
        let path = search_output_path(Path::new("results"), &params);
        assert_eq!(
            path,
            PathBuf::from("results/_.._etc_passwd/reddit_______etc_passwd_week_relevance.json")
        );
        assert!(path
            .components()
            .all(|c| !matches!(c, std::path::Component::ParentDir)));

        let params = SearchParameters {
            search_term: "..".to_string(),
            ..SearchParameters::default()
        };
        let path = search_output_path(Path::new("results"), &params);
        assert_eq!(path.parent(), Some(Path::new("results/search")));
    }

    #[test]
    fn test_summarized_path() {
        let path =
            summarized_path(Path::new("results/google stock/reddit_google_stock_day_hot.json"));
        assert_eq!(
            path,
            PathBuf::from("results/google stock/reddit_google_stock_day_hot_summarized.json")
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_results(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn test_save_then_load_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        let results = SearchResults::new(
            SearchMetadata::now("0.1.0"),
            SearchParameters::default(),
            Vec::new(),
        );

        save_results(&path, &results).unwrap();
        let loaded = load_results(&path).unwrap();
        assert_eq!(loaded.metadata.tool_version, "0.1.0");
        assert!(!loaded.results_summary.success);
    }

    #[test]
    fn test_loads_minimal_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minimal.json");
        fs::write(&path, r#"{"posts": []}"#).unwrap();
        let loaded = load_results(&path).unwrap();
        assert_eq!(loaded.search_parameters.search_term, "Unknown");
        assert!(loaded.posts.is_empty());
    }
}
