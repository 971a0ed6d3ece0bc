use crate::candidate::{ChunkMeta, FileRelations};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves file-level imports/exports/usages for a file path.
pub trait FileRelationResolver {
    fn resolve_file_relations(&self, file: &str, case_sensitive: bool) -> Option<FileRelations>;
}

/// Resolver for corpora without file-level relations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFileRelations;

impl FileRelationResolver for NoFileRelations {
    fn resolve_file_relations(&self, _file: &str, _case_sensitive: bool) -> Option<FileRelations> {
        None
    }
}

impl FileRelationResolver for HashMap<String, FileRelations> {
    fn resolve_file_relations(&self, file: &str, case_sensitive: bool) -> Option<FileRelations> {
        if let Some(relations) = self.get(file) {
            return Some(relations.clone());
        }
        if case_sensitive {
            return None;
        }
        // Deterministic pick when several keys differ only by case.
        self.iter()
            .filter(|(path, _)| path.eq_ignore_ascii_case(file))
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, relations)| relations.clone())
    }
}

impl<F> FileRelationResolver for F
where
    F: Fn(&str, bool) -> Option<FileRelations>,
{
    fn resolve_file_relations(&self, file: &str, case_sensitive: bool) -> Option<FileRelations> {
        self(file, case_sensitive)
    }
}

/// Per-query memo of file relations and relation-enriched chunk metadata.
///
/// Lives for exactly one rank pass; nothing is shared across queries.
pub struct QueryCache<'a> {
    resolver: &'a dyn FileRelationResolver,
    case_sensitive: bool,
    relations_by_file: HashMap<String, Option<Arc<FileRelations>>>,
    enriched_by_idx: HashMap<usize, Arc<ChunkMeta>>,
    resolver_calls: usize,
}

impl<'a> QueryCache<'a> {
    pub fn new(resolver: &'a dyn FileRelationResolver, case_sensitive: bool) -> Self {
        Self {
            resolver,
            case_sensitive,
            relations_by_file: HashMap::new(),
            enriched_by_idx: HashMap::new(),
            resolver_calls: 0,
        }
    }

    pub fn relations_for(&mut self, file: &str) -> Option<Arc<FileRelations>> {
        if let Some(cached) = self.relations_by_file.get(file) {
            return cached.clone();
        }
        self.resolver_calls += 1;
        let resolved = self
            .resolver
            .resolve_file_relations(file, self.case_sensitive)
            .map(Arc::new);
        self.relations_by_file
            .insert(file.to_string(), resolved.clone());
        resolved
    }

    /// Chunk metadata with its file's imports and exports merged in.
    pub fn enriched(&mut self, idx: usize, chunk: &ChunkMeta) -> Arc<ChunkMeta> {
        if let Some(cached) = self.enriched_by_idx.get(&idx) {
            return Arc::clone(cached);
        }
        let enriched = match self.relations_for(&chunk.file) {
            Some(relations) => {
                let mut merged = chunk.clone();
                merge_unique(&mut merged.exports, &relations.exports);
                merge_unique(&mut merged.imports, &relations.imports);
                Arc::new(merged)
            }
            None => Arc::new(chunk.clone()),
        };
        self.enriched_by_idx.insert(idx, Arc::clone(&enriched));
        enriched
    }

    #[must_use]
    pub const fn resolver_calls(&self) -> usize {
        self.resolver_calls
    }

    #[must_use]
    pub fn cached_files(&self) -> usize {
        self.relations_by_file.len()
    }
}

fn merge_unique(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn resolver_runs_once_per_file() {
        let calls = Cell::new(0);
        let resolver = |file: &str, _case_sensitive: bool| {
            calls.set(calls.get() + 1);
            (file == "src/a.rs").then(|| FileRelations {
                exports: vec!["load".to_string()],
                ..Default::default()
            })
        };
        let mut cache = QueryCache::new(&resolver, false);

        let a1 = ChunkMeta::new("src/a.rs").name("load");
        let a2 = ChunkMeta::new("src/a.rs").name("save");
        let b = ChunkMeta::new("src/b.rs");

        assert_eq!(cache.enriched(0, &a1).exports, vec!["load".to_string()]);
        assert_eq!(cache.enriched(1, &a2).exports, vec!["load".to_string()]);
        assert!(cache.enriched(2, &b).exports.is_empty());
        assert!(cache.enriched(2, &b).exports.is_empty());

        assert_eq!(calls.get(), 2);
        assert_eq!(cache.resolver_calls(), 2);
        assert_eq!(cache.cached_files(), 2);
    }

    #[test]
    fn map_resolver_falls_back_to_case_insensitive() {
        let mut map = HashMap::new();
        map.insert(
            "Src/Lib.rs".to_string(),
            FileRelations {
                usages: vec!["x".to_string()],
                ..Default::default()
            },
        );
        assert!(map.resolve_file_relations("src/lib.rs", false).is_some());
        assert!(map.resolve_file_relations("src/lib.rs", true).is_none());
    }
}
