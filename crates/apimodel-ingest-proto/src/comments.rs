//! Source comments keyed by location path.

use crate::descriptor::FileDescriptorProto;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct CommentIndex {
    by_path: HashMap<Vec<i32>, String>,
}

impl CommentIndex {
    /// Index the leading comment of every location in `file`, falling back to
    /// the trailing comment.
    pub fn for_file(file: &FileDescriptorProto) -> Self {
        let mut by_path = HashMap::new();
        let Some(info) = &file.source_code_info else {
            return Self { by_path };
        };
        for loc in &info.location {
            let text = [&loc.leading_comments, &loc.trailing_comments]
                .into_iter()
                .flatten()
                .map(|c| normalize(c))
                .find(|c| !c.is_empty());
            if let Some(text) = text {
                by_path.insert(loc.path.clone(), text);
            }
        }
        Self { by_path }
    }

    pub fn get(&self, path: &[i32]) -> String {
        self.by_path.get(path).cloned().unwrap_or_default()
    }
}

/// Strip the single space `protoc` leaves after `//` on each line and drop
/// surrounding blank lines.
fn normalize(comment: &str) -> String {
    comment
        .lines()
        .map(|line| line.strip_prefix(' ').unwrap_or(line).trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}
