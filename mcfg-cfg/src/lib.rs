//! Runtime settings for `mcfg`.
//!
//! Each crate declares the settings it reads as `static` [`Config`]s and registers them into
//! a [`ConfigSet`]. A [`ConfigSet`] is cheap to clone and every clone observes updates, so a
//! long lived compiler or build can read its overrides at the moment it needs them and pick
//! up changes without being rebuilt.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};

use compact_str::CompactString;

/// Prefix for environment variables that override settings, e.g. `MCFG_MACH_COMMAND`.
pub static ENV_PREFIX: &str = "MCFG_";

/// A single configuration setting.
pub struct Config<V: ConfigDefault> {
    name: &'static str,
    desc: &'static str,
    value: V,
}

impl<V: ConfigDefault> Config<V> {
    /// Define a new [`Config`] with a default value.
    pub const fn new(name: &'static str, desc: &'static str, default: V) -> Self {
        Config {
            name,
            desc,
            value: default,
        }
    }

    /// Name this [`Config`] is registered under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read the value of this [`Config`] from the provided [`ConfigSet`].
    ///
    /// # Panics
    /// * If this [`Config`] was never registered with the [`ConfigSet`].
    pub fn read(&self, set: &ConfigSet) -> V::StoredValue {
        let Some(entry) = set.configs.get(self.name) else {
            panic!("tried to read unregistered config {}", self.name);
        };
        V::from_shared(&entry.value)
    }
}

/// A thread-safe shareable set of [`Config`]s.
#[derive(Clone, Debug)]
pub struct ConfigSet {
    configs: Arc<BTreeMap<CompactString, ConfigSetEntry>>,
}

impl ConfigSet {
    /// Returns a new [`ConfigSetBuilder`].
    pub fn builder() -> ConfigSetBuilder {
        ConfigSetBuilder::default()
    }

    /// Update [`Config`] in this [`ConfigSet`] with the specified value.
    ///
    /// # Panics
    /// * If [`Config`] was not previously registered with the original [`ConfigSetBuilder`].
    pub fn update<V: ConfigDefault>(&self, config: &'static Config<V>, value: V) {
        let entry = self
            .configs
            .get(config.name)
            .expect("tried to update unregistered config");
        entry.value.update(value.to_dyn());
    }

    /// Update the [`Config`] in this [`ConfigSet`] with `name` to `value`.
    ///
    /// # Errors
    ///
    /// * If no config named `name` exists in this set.
    /// * If the config specified by `name` cannot parse `value`.
    ///
    pub fn try_update(&self, name: &str, value: &str) -> Result<(), anyhow::Error> {
        let entry = self
            .configs
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no Config named '{name}' found"))?;
        entry.value.update_parse(value)?;
        Ok(())
    }

    /// Apply every `name = value` pair of a TOML document.
    ///
    /// Only top level strings and booleans are accepted.
    pub fn load_toml(&self, raw: &str) -> Result<(), anyhow::Error> {
        let table: toml::Table = raw.parse()?;
        for (name, value) in table {
            let value = match value {
                toml::Value::String(val) => val,
                toml::Value::Boolean(val) => val.to_string(),
                other => anyhow::bail!(
                    "setting '{name}' must be a string or boolean, found {}",
                    other.type_str()
                ),
            };
            self.try_update(&name, &value)?;
        }
        Ok(())
    }

    /// Apply the settings file at `path`, see [`ConfigSet::load_toml`].
    pub fn load_toml_file(&self, path: &Path) -> Result<(), anyhow::Error> {
        tracing::info!(?path, "loading settings");
        let raw = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("failed to read settings {}: {err}", path.display()))?;
        self.load_toml(&raw)
    }

    /// Apply every `MCFG_<NAME>` environment variable that names a registered [`Config`].
    ///
    /// Variables that don't match a registered name are ignored.
    pub fn load_env(&self) -> Result<(), anyhow::Error> {
        for (name, value) in mcfg_ore::env::prefixed_vars(ENV_PREFIX) {
            if !self.configs.contains_key(name.as_str()) {
                tracing::debug!(%name, "ignoring unknown settings variable");
                continue;
            }
            tracing::debug!(%name, %value, "setting from environment");
            self.try_update(&name, &value)?;
        }
        Ok(())
    }
}

impl fmt::Display for ConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, entry) in &*self.configs {
            writeln!(f, "{} => '{}'\n\t└─ {}", name, entry.value, entry.desc)?;
        }
        Ok(())
    }
}

/// Single entry within a [`ConfigSet`].
#[derive(Clone, Debug)]
pub struct ConfigSetEntry {
    value: DynConfigValueShared,
    desc: &'static str,
}

/// A builder for a [`ConfigSet`].
#[derive(Default, Debug)]
pub struct ConfigSetBuilder {
    configs: BTreeMap<CompactString, (DynConfigValue, &'static str)>,
}

impl ConfigSetBuilder {
    /// Register a [`Config`] into this [`ConfigSetBuilder`] with the default value.
    ///
    /// # Panics
    /// * If a [`Config`] with the same name was already registered.
    pub fn register<V: ConfigDefault>(&mut self, config: &'static Config<V>) -> &mut Self {
        let value = config.value.to_dyn();
        let prev = self
            .configs
            .insert(CompactString::const_new(config.name), (value, config.desc));
        if let Some((prev, _)) = prev {
            panic!("config '{}' registered more than once, previous {prev:?}", config.name);
        }
        self
    }

    /// Consumes this [`ConfigSetBuilder`] constructing a [`ConfigSet`].
    pub fn build(self) -> ConfigSet {
        let configs = self
            .configs
            .into_iter()
            .map(|(name, (value, desc))| {
                let entry = ConfigSetEntry {
                    value: value.into_shared(),
                    desc,
                };
                (name, entry)
            })
            .collect();
        ConfigSet {
            configs: Arc::new(configs),
        }
    }
}

/// Types that can be provided as a default to a [`Config`].
pub trait ConfigDefault {
    /// The type that gets handed back when reading from a [`ConfigSet`].
    type StoredValue;

    fn to_dyn(&self) -> DynConfigValue;
    fn from_shared(val: &DynConfigValueShared) -> Self::StoredValue;
}

impl ConfigDefault for bool {
    type StoredValue = bool;

    fn to_dyn(&self) -> DynConfigValue {
        DynConfigValue::Bool(*self)
    }

    fn from_shared(val: &DynConfigValueShared) -> Self::StoredValue {
        let DynConfigValueShared::Bool(val) = val else {
            panic!("programming error, found {val:?} for bool")
        };
        val.load(Ordering::SeqCst)
    }
}

impl ConfigDefault for &str {
    type StoredValue = CompactString;

    fn to_dyn(&self) -> DynConfigValue {
        DynConfigValue::String(CompactString::new(self))
    }

    fn from_shared(val: &DynConfigValueShared) -> Self::StoredValue {
        let DynConfigValueShared::String(val) = val else {
            panic!("programming error, found {val:?} for string")
        };
        let read_lock = val
            .read()
            .expect("DynConfigValueShared::String lock poisoned");
        read_lock.clone()
    }
}

/// "Type erased" configuration values.
#[derive(Debug)]
pub enum DynConfigValue {
    Bool(bool),
    String(CompactString),
}

impl DynConfigValue {
    pub fn into_shared(self) -> DynConfigValueShared {
        match self {
            DynConfigValue::Bool(val) => DynConfigValueShared::Bool(Arc::new(AtomicBool::new(val))),
            DynConfigValue::String(val) => DynConfigValueShared::String(Arc::new(RwLock::new(val))),
        }
    }
}

/// Shareable instance of [`DynConfigValue`].
#[derive(Clone, Debug)]
pub enum DynConfigValueShared {
    Bool(Arc<AtomicBool>),
    String(Arc<RwLock<CompactString>>),
}

impl DynConfigValueShared {
    pub fn update(&self, value: DynConfigValue) {
        match (self, value) {
            (DynConfigValueShared::Bool(shared), DynConfigValue::Bool(val)) => {
                shared.store(val, Ordering::SeqCst);
            }
            (DynConfigValueShared::String(shared), DynConfigValue::String(val)) => {
                let mut write_lock = shared
                    .write()
                    .expect("DynConfigValueShared::String lock poisoned");
                *write_lock = val;
            }
            (shared, val) => unreachable!("tried to update shared {shared:?} with {val:?}"),
        }
    }

    pub fn update_parse(&self, value: &str) -> Result<(), anyhow::Error> {
        match self {
            DynConfigValueShared::Bool(shared) => {
                let val = match value.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    other => anyhow::bail!("'{other}' is not a boolean"),
                };
                shared.store(val, Ordering::SeqCst);
            }
            DynConfigValueShared::String(shared) => {
                let mut write_lock = shared
                    .write()
                    .expect("DynConfigValueShared::String lock poisoned");
                write_lock.clear();
                write_lock.push_str(value);
            }
        }

        Ok(())
    }
}

impl fmt::Display for DynConfigValueShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynConfigValueShared::Bool(val) => write!(f, "{}", val.load(Ordering::SeqCst)),
            DynConfigValueShared::String(val) => {
                let read_lock = val
                    .read()
                    .expect("DynConfigValueShared::String lock poisoned");
                write!(f, "{}", *read_lock)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub static TEST_COMMAND: Config<&'static str> =
        Config::new("test_command", "A test command override.", "");
    pub static TEST_VERBOSE: Config<bool> =
        Config::new("test_verbose", "A test configuration value.", false);

    fn test_set() -> ConfigSet {
        let mut builder = ConfigSet::builder();
        builder.register(&TEST_COMMAND).register(&TEST_VERBOSE);
        builder.build()
    }

    #[test]
    fn smoketest_read() {
        let set = test_set();
        assert_eq!(TEST_COMMAND.read(&set), "");
        assert!(!TEST_VERBOSE.read(&set));
    }

    #[test]
    fn updates_are_shared_across_clones() {
        let set = test_set();
        let clone = set.clone();

        set.update(&TEST_COMMAND, "/opt/clang/bin/clang -v");
        assert_eq!(TEST_COMMAND.read(&clone), "/opt/clang/bin/clang -v");

        clone.update(&TEST_VERBOSE, true);
        assert!(TEST_VERBOSE.read(&set));
    }

    #[test]
    fn smoketest_parse() {
        let set = test_set();

        set.try_update("test_verbose", "yes").unwrap();
        assert!(TEST_VERBOSE.read(&set));
        set.try_update("test_verbose", "off").unwrap();
        assert!(!TEST_VERBOSE.read(&set));
        assert!(set.try_update("test_verbose", "maybe").is_err());

        set.try_update("test_command", "mach --debug").unwrap();
        assert_eq!(TEST_COMMAND.read(&set), "mach --debug");

        assert!(set.try_update("not_registered", "1").is_err());
    }

    #[test]
    fn load_toml() {
        let set = test_set();
        set.load_toml(
            r#"
test_command = "/usr/bin/clang-18"
test_verbose = true
"#,
        )
        .unwrap();
        assert_eq!(TEST_COMMAND.read(&set), "/usr/bin/clang-18");
        assert!(TEST_VERBOSE.read(&set));

        assert!(set.load_toml("test_verbose = 3").is_err());
        assert!(set.load_toml("unknown = \"x\"").is_err());
    }

    #[test]
    fn load_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "test_command = \"./mach\"\n").unwrap();

        let set = test_set();
        set.load_toml_file(&path).unwrap();
        assert_eq!(TEST_COMMAND.read(&set), "./mach");

        assert!(set.load_toml_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    #[should_panic(expected = "registered more than once")]
    fn double_register_panics() {
        let mut builder = ConfigSet::builder();
        builder.register(&TEST_COMMAND).register(&TEST_COMMAND);
    }

    #[test]
    fn display_lists_every_setting() {
        let set = test_set();
        let rendered = set.to_string();
        assert!(rendered.contains("test_command"));
        assert!(rendered.contains("test_verbose => 'false'"));
    }
}
