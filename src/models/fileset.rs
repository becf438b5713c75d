use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single generated file: path plus content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub path: String,
    pub content: String,
}

impl FileArtifact {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Path-keyed set of generated files.
///
/// Paths are unique; inserting an existing path replaces its content
/// (last-write-wins). Iteration order is the sorted path order, which is what
/// makes archive building deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSet {
    files: BTreeMap<String, String>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, replacing any previous content at the same path.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// (path, content) pairs in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Overlay `other` on top of this set, replacing overlapping paths.
    /// Repair and edit responses may re-emit only the files that change.
    pub fn merge(&mut self, other: FileSet) {
        self.files.extend(other.files);
    }

    /// Paths whose content differs from (or is absent in) `other`.
    pub fn changed_paths(&self, other: &FileSet) -> Vec<String> {
        let mut changed: Vec<String> = self
            .files
            .iter()
            .filter(|(p, c)| other.get(p) != Some(c.as_str()))
            .map(|(p, _)| p.clone())
            .collect();
        for path in other.paths() {
            if !self.contains(path) {
                changed.push(path.to_string());
            }
        }
        changed.sort();
        changed.dedup();
        changed
    }
}

impl FromIterator<(String, String)> for FileSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = FileSet::new();
        for (path, content) in iter {
            set.insert(path, content);
        }
        set
    }
}

impl From<Vec<FileArtifact>> for FileSet {
    fn from(artifacts: Vec<FileArtifact>) -> Self {
        artifacts
            .into_iter()
            .map(|a| (a.path, a.content))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_last_write_wins() {
        let mut set = FileSet::new();
        set.insert("index.html", "stub");
        set.insert("index.html", "full");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("index.html"), Some("full"));
    }

    #[test]
    fn test_iteration_is_sorted() {
        let mut set = FileSet::new();
        set.insert("style.css", "b");
        set.insert("about.html", "a");
        set.insert("index.html", "i");
        let paths: Vec<&str> = set.paths().collect();
        assert_eq!(paths, vec!["about.html", "index.html", "style.css"]);
    }

    #[test]
    fn test_merge_overlays_changed_files() {
        let mut base = FileSet::new();
        base.insert("index.html", "old");
        base.insert("style.css", "body {}");

        let mut delta = FileSet::new();
        delta.insert("index.html", "new");
        delta.insert("app.js", "init()");

        base.merge(delta);
        assert_eq!(base.len(), 3);
        assert_eq!(base.get("index.html"), Some("new"));
        assert_eq!(base.get("style.css"), Some("body {}"));
    }

    #[test]
    fn test_changed_paths() {
        let mut a = FileSet::new();
        a.insert("index.html", "<html>1</html>");
        a.insert("style.css", "body {}");

        let mut b = a.clone();
        assert!(a.changed_paths(&b).is_empty());

        b.insert("style.css", "body { color: red }");
        assert_eq!(a.changed_paths(&b), vec!["style.css".to_string()]);

        b.insert("extra.js", "console.log(1)");
        let changed = a.changed_paths(&b);
        assert_eq!(
            changed,
            vec!["extra.js".to_string(), "style.css".to_string()]
        );
    }

    #[test]
    fn test_serde_transparent() {
        let mut set = FileSet::new();
        set.insert("index.html", "<html></html>");
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.starts_with('{'));
        let parsed: FileSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, set);
    }

    #[test]
    fn test_from_artifacts() {
        let set: FileSet = vec![
            FileArtifact::new("a.html", "one"),
            FileArtifact::new("a.html", "two"),
        ]
        .into();
        assert_eq!(set.get("a.html"), Some("two"));
    }
}
