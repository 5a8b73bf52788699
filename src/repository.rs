//! Module repository: every module of the suite, instantiated per ABI.
//!
//! The repository is built once by scanning the testcases directory and is
//! read-only afterwards. Selection returns copies, so the same repository
//! can serve every shard of a run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::abi::Abi;
use crate::component::{ComponentKind, ComponentRegistry};
use crate::config_file::{self, ConfigError, ModuleConfig};
use crate::filter::{NamePattern, TestFilter};
use crate::module::ModuleDefinition;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("No ABIs to instantiate modules for")]
    NoAbis,

    #[error("Failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRepository {
    modules: BTreeMap<String, ModuleDefinition>,
}

impl ModuleRepository {
    /// Scans `dir` for `*.config` files and instantiates each for every ABI.
    ///
    /// # Errors
    ///
    /// Fails if `abis` is empty, the directory cannot be read, or any
    /// configuration file fails to parse or names an invalid component.
    pub fn scan(dir: &Path, abis: &[Abi], registry: &ComponentRegistry) -> RepositoryResult<Self> {
        if abis.is_empty() {
            return Err(RepositoryError::NoAbis);
        }

        let io_error = |source| RepositoryError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == config_file::CONFIG_EXT) {
                files.push(path);
            }
        }
        files.sort();

        let mut repository = Self::default();
        for path in &files {
            let name = config_file::module_name(path)
                .ok_or_else(|| ConfigError::InvalidName(path.clone()))?;
            let config = ModuleConfig::load(path)?;
            for (kind, specs) in [
                (ComponentKind::Preparer, &config.preparers),
                (ComponentKind::Test, &config.tests),
            ] {
                for spec in specs {
                    registry
                        .validate(kind, spec)
                        .map_err(|source| ConfigError::Component {
                            path: path.clone(),
                            source,
                        })?;
                }
            }
            for abi in abis {
                repository.insert(ModuleDefinition::new(
                    name,
                    abi.clone(),
                    config.preparers.clone(),
                    config.tests.clone(),
                ));
            }
        }

        debug!(
            "Loaded {} modules from {} config files in {}",
            repository.modules.len(),
            files.len(),
            dir.display()
        );
        Ok(repository)
    }

    /// Adds a module, replacing any module with the same id.
    pub fn insert(&mut self, module: ModuleDefinition) {
        if let Some(previous) = self.modules.insert(module.id().to_string(), module) {
            warn!("Duplicate module id '{}', keeping the last one", previous.id());
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get_module(&self, id: &str) -> Option<&ModuleDefinition> {
        self.modules.get(id)
    }

    /// Every module, in natural order.
    pub fn get_modules(&self) -> Vec<&ModuleDefinition> {
        let mut modules: Vec<_> = self.modules.values().collect();
        modules.sort();
        modules
    }

    /// Modules selected by the filters, in natural order.
    ///
    /// A module is selected if there are no includes or some include
    /// matches it, and no module-level exclude matches it. Excludes that
    /// name a test never remove a whole module.
    pub fn get_modules_filtered(
        &self,
        includes: &[TestFilter],
        excludes: &[TestFilter],
    ) -> Vec<&ModuleDefinition> {
        let mut modules: Vec<_> = self
            .modules
            .values()
            .filter(|module| {
                let (abi, name) = (module.abi().name(), module.name());
                (includes.is_empty() || includes.iter().any(|f| f.matches(module)))
                    && !excludes
                        .iter()
                        .any(|f| !f.is_test_level() && f.matches(module))
            })
            .collect();
        modules.sort();
        modules
    }

    /// Owned copies of the selected modules with test-level filters
    /// forwarded into each module's sub-test scope.
    pub fn select(&self, includes: &[TestFilter], excludes: &[TestFilter]) -> Vec<ModuleDefinition> {
        self.get_modules_filtered(includes, excludes)
            .into_iter()
            .map(|module| {
                let mut selected = module.clone();
                for filter in includes.iter().filter(|f| f.matches(module)) {
                    if let Some(test) = filter.test() {
                        selected.add_include_filter(test);
                    }
                }
                for filter in excludes.iter().filter(|f| f.matches(module)) {
                    if let Some(test) = filter.test() {
                        selected.add_exclude_filter(test);
                    }
                }
                selected
            })
            .collect()
    }

    /// Module name to its per-ABI instances, sorted by ABI.
    pub fn get_modules_by_name(&self) -> BTreeMap<&str, Vec<&ModuleDefinition>> {
        let mut by_name: BTreeMap<&str, Vec<&ModuleDefinition>> = BTreeMap::new();
        for module in self.modules.values() {
            by_name.entry(module.name()).or_default().push(module);
        }
        for modules in by_name.values_mut() {
            modules.sort_by(|a, b| a.abi().name().cmp(b.abi().name()));
        }
        by_name
    }

    /// Distinct module names, sorted.
    pub fn get_module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.values().map(|m| m.name()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Every module id, sorted.
    pub fn get_module_ids(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Distinct module names fully matching `pattern`.
    pub fn get_modules_matching(&self, pattern: &str) -> Vec<&str> {
        let pattern = NamePattern::new(pattern);
        let mut names: Vec<&str> = self
            .modules
            .values()
            .filter(|m| m.name_matches(&pattern))
            .map(|m| m.name())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const SHELL_CONFIG: &str = r#"<configuration>
  <test class="shell-test">
    <option name="case" value="testA=true"/>
  </test>
</configuration>"#;

    fn write_configs(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(format!("{}.config", name)), SHELL_CONFIG).unwrap();
        }
    }

    fn abis(names: &[&str]) -> Vec<Abi> {
        names.iter().map(|n| Abi::new(*n)).collect()
    }

    fn repo(names: &[&str], abi_names: &[&str]) -> (tempfile::TempDir, ModuleRepository) {
        let dir = tempfile::tempdir().unwrap();
        write_configs(dir.path(), names);
        let repository =
            ModuleRepository::scan(dir.path(), &abis(abi_names), &ComponentRegistry::with_builtins())
                .unwrap();
        (dir, repository)
    }

    fn ids(modules: &[&ModuleDefinition]) -> Vec<String> {
        modules.iter().map(|m| m.id().to_string()).collect()
    }

    #[test]
    fn test_every_config_times_every_abi() {
        let (_dir, repository) = repo(&["ModuleA", "ModuleB", "ModuleC"], &["armeabi-v7a", "arm64-v8a"]);
        assert_eq!(repository.len(), 6);
        let unique: BTreeSet<_> = repository.get_module_ids().into_iter().collect();
        assert_eq!(unique.len(), 6);
        assert!(repository.get_module("arm64-v8a ModuleB").is_some());
        assert_eq!(repository.get_module_names(), vec!["ModuleA", "ModuleB", "ModuleC"]);
        let by_name = repository.get_modules_by_name();
        let abis: Vec<_> = by_name["ModuleA"].iter().map(|m| m.abi().name()).collect();
        assert_eq!(abis, vec!["arm64-v8a", "armeabi-v7a"]);
    }

    #[test]
    fn test_non_config_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_configs(dir.path(), &["ModuleA"]);
        std::fs::write(dir.path().join("ModuleA.apk"), "binary").unwrap();
        std::fs::create_dir(dir.path().join("Nested.config")).unwrap();
        let repository =
            ModuleRepository::scan(dir.path(), &abis(&["x86"]), &ComponentRegistry::with_builtins())
                .unwrap();
        assert_eq!(repository.get_module_ids(), vec!["x86 ModuleA"]);
    }

    #[test]
    fn test_empty_filters_select_everything_sorted() {
        let (_dir, repository) = repo(&["b", "a", "C"], &["x86"]);
        let selected = repository.get_modules_filtered(&[], &[]);
        assert_eq!(ids(&selected), vec!["x86 C", "x86 a", "x86 b"]);
    }

    #[test]
    fn test_module_level_exclude_removes_module() {
        let (_dir, repository) = repo(&["ModuleA", "ModuleB"], &["x86"]);
        let exclude: TestFilter = "!ModuleA".parse().unwrap();
        let selected = repository.get_modules_filtered(&[], &[exclude]);
        assert_eq!(ids(&selected), vec!["x86 ModuleB"]);
    }

    #[test]
    fn test_test_level_exclude_keeps_module() {
        let (_dir, repository) = repo(&["ModuleA", "ModuleB"], &["x86"]);
        let exclude: TestFilter = "!ModuleA a.B#c".parse().unwrap();
        let selected = repository.select(&[], &[exclude]);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].name(), "ModuleA");
        assert_eq!(selected[0].exclude_filters(), ["a.B#c"]);
        assert!(selected[1].exclude_filters().is_empty());
    }

    #[test]
    fn test_includes_with_abi_and_pattern() {
        let (_dir, repository) = repo(&["CtsFoo", "CtsBar", "Other"], &["x86", "arm64-v8a"]);
        let include: TestFilter = "x86 Cts.*".parse().unwrap();
        let selected = repository.get_modules_filtered(&[include], &[]);
        assert_eq!(ids(&selected), vec!["x86 CtsBar", "x86 CtsFoo"]);
    }

    #[test]
    fn test_select_forwards_test_includes() {
        let (_dir, repository) = repo(&["ModuleA"], &["x86"]);
        let include: TestFilter = "ModuleA a.B#c".parse().unwrap();
        let selected = repository.select(&[include], &[]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].include_filters(), ["a.B#c"]);
        // The repository itself is untouched.
        assert!(repository.get_module("x86 ModuleA").unwrap().include_filters().is_empty());
    }

    #[test]
    fn test_modules_matching() {
        let (_dir, repository) = repo(&["CtsFoo", "CtsFooBar", "Other"], &["x86", "x86_64"]);
        assert_eq!(repository.get_modules_matching("CtsFoo.*"), vec!["CtsFoo", "CtsFooBar"]);
        assert_eq!(repository.get_modules_matching("Foo"), Vec::<&str>::new());
    }

    #[test]
    fn test_scan_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ComponentRegistry::with_builtins();
        assert!(matches!(
            ModuleRepository::scan(dir.path(), &[], &registry),
            Err(RepositoryError::NoAbis)
        ));

        std::fs::write(dir.path().join("Bad.config"), "<configuration><test class=\"nope\"/></configuration>").unwrap();
        let err = ModuleRepository::scan(dir.path(), &abis(&["x86"]), &registry).unwrap_err();
        assert!(err.to_string().contains("Bad.config"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_config_name_is_an_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        write_configs(dir.path(), &["ModuleA"]);
        let name = OsStr::from_bytes(b"Module\xff.config");
        std::fs::write(dir.path().join(name), SHELL_CONFIG).unwrap();

        let err = ModuleRepository::scan(
            dir.path(),
            &abis(&["x86"]),
            &ComponentRegistry::with_builtins(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Config(ConfigError::InvalidName(_))
        ));
    }
}
