use crate::case::Case;
use crate::parser::parse_case;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

type SourceReader = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Memoizes parsed cases by source identifier.
///
/// The first `get_case` for an identifier reads and parses the source,
/// later calls share the stored case. Lookup and population happen under
/// one lock, so an identifier is never parsed twice. Cached cases are
/// immutable: callers that modify a case must clone it first.
pub struct CaseCache {
    reader: Box<SourceReader>,
    cases: Mutex<HashMap<String, Arc<Case>>>,
}

impl Default for CaseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseCache {
    /// Cache over case files, the source identifier being the file path.
    pub fn new() -> Self {
        Self::with_reader(|source| {
            fs::read_to_string(source).with_context(|| format!("reading case file '{}'", source))
        })
    }

    /// Cache over an arbitrary text source.
    pub fn with_reader<F>(reader: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            reader: Box::new(reader),
            cases: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_case(&self, source: &str) -> Result<Arc<Case>> {
        let mut cases = self.cases();
        if let Some(case) = cases.get(source) {
            return Ok(Arc::clone(case));
        }

        log::info!("loading case '{}'", source);
        let text = (self.reader)(source)?;
        let case = Arc::new(parse_case(&text));
        cases.insert(source.to_string(), Arc::clone(&case));
        Ok(case)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.cases().contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.cases().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases().is_empty()
    }

    /// Drops one cached case. Returns whether it was present.
    pub fn evict(&self, source: &str) -> bool {
        self.cases().remove(source).is_some()
    }

    pub fn clear(&self) {
        self.cases().clear();
    }

    fn cases(&self) -> MutexGuard<'_, HashMap<String, Arc<Case>>> {
        // Entries are inserted whole, so a poisoned map is still consistent.
        self.cases.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::set_load;
    use anyhow::{format_err, Result};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const CASE: &str = "mpc.bus = [\n\
        1 3 0 0 0 0 1 1 0 230 1 1.1 0.9;\n\
        5 1 40 0 0 0 1 1 0 230 1 1.1 0.9;\n\
        ];";

    fn counting_cache() -> (CaseCache, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let cache = CaseCache::with_reader(move |source| {
            counter.fetch_add(1, Ordering::SeqCst);
            match source {
                "mem://case" => Ok(CASE.to_string()),
                _ => Err(format_err!("no such source: {}", source)),
            }
        });
        (cache, reads)
    }

    #[test]
    fn test_get_case_parses_once() -> Result<()> {
        let (cache, reads) = counting_cache();

        let first = cache.get_case("mem://case")?;
        let second = cache.get_case("mem://case")?;

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(*first, *second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_concurrent_get_case_parses_once() -> Result<()> {
        assert_send_sync::<CaseCache>();
        let (cache, reads) = counting_cache();

        let cases = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| cache.get_case("mem://case")))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("get_case thread panicked"))
                .collect::<Result<Vec<Arc<Case>>>>()
        })?;

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(cases.len(), 8);
        assert!(cases.iter().all(|case| Arc::ptr_eq(case, &cases[0])));
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn test_scenario_copy_leaves_cache_untouched() -> Result<()> {
        let (cache, _) = counting_cache();

        let mut scenario = (*cache.get_case("mem://case")?).clone();
        set_load(&mut scenario, 5, 75.0);
        assert_eq!(scenario.bus[1].pd, 75.0);

        let cached = cache.get_case("mem://case")?;
        assert_eq!(cached.bus[1].pd, 40.0);
        Ok(())
    }

    #[test]
    fn test_read_failure_is_not_cached() {
        let (cache, reads) = counting_cache();

        assert!(cache.get_case("mem://missing").is_err());
        assert!(cache.get_case("mem://missing").is_err());
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_and_clear() -> Result<()> {
        let (cache, reads) = counting_cache();

        cache.get_case("mem://case")?;
        assert!(cache.contains("mem://case"));
        assert!(cache.evict("mem://case"));
        assert!(!cache.evict("mem://case"));

        cache.get_case("mem://case")?;
        assert_eq!(reads.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_file_cache() -> Result<()> {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")?;
        let path = Path::new(&manifest_dir).join("casedata").join("case5_lmp.m");
        let source = path.to_string_lossy();

        let cache = CaseCache::new();
        let case = cache.get_case(&source)?;
        assert_eq!(case.bus.len(), 5);
        assert!(cache.get_case("casedata/does_not_exist.m").is_err());
        Ok(())
    }
}
