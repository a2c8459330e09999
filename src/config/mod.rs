/*!
Run configuration fragments and their merge.

A fragment (`PartialConfig`) comes from `.diem.json`, the `diem` field of
`package.json`, or the command line. Fragments that could not be fetched or
parsed are `None` and are dropped before folding (`merge_present`).

Merge rules, left to right:
  files               : concatenation, order kept, no dedup
  entrypoint          : first non-empty value wins, else `DEFAULT_ENTRYPOINT`
  installDependencies : OR over all fragments, else false
*/

use serde::Deserialize;

/// Entrypoint used when no fragment names one.
pub const DEFAULT_ENTRYPOINT: &str = "diem.js";

/// One partial source of configuration. `null` and missing keys are both
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialConfig {
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub install_dependencies: Option<bool>,
}

impl PartialConfig {
    /// Entrypoint if set to something non-empty.
    fn stated_entrypoint(&self) -> Option<&str> {
        self.entrypoint.as_deref().filter(|e| !e.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.files.as_ref().is_none_or(Vec::is_empty)
            && self.stated_entrypoint().is_none()
            && self.install_dependencies.is_none()
    }
}

/// Fully resolved configuration, no optional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub files: Vec<String>,
    pub entrypoint: String,
    pub install_dependencies: bool,
}

impl EffectiveConfig {
    /// Every file to download: the listed files followed by the entrypoint.
    pub fn downloads(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.entrypoint.as_str()))
    }
}

impl From<EffectiveConfig> for PartialConfig {
    fn from(cfg: EffectiveConfig) -> Self {
        PartialConfig {
            files: Some(cfg.files),
            entrypoint: Some(cfg.entrypoint),
            install_dependencies: Some(cfg.install_dependencies),
        }
    }
}

/// Fold accumulator; the entrypoint default is applied only at the end.
#[derive(Default)]
struct Merged {
    files: Vec<String>,
    entrypoint: Option<String>,
    install_dependencies: bool,
}

impl Merged {
    fn absorb(mut self, fragment: PartialConfig) -> Self {
        let PartialConfig {
            files,
            entrypoint,
            install_dependencies,
        } = fragment;
        if let Some(files) = files {
            self.files.extend(files);
        }
        if self.entrypoint.is_none() {
            self.entrypoint = entrypoint.filter(|e| !e.is_empty());
        }
        self.install_dependencies |= install_dependencies.unwrap_or(false);
        self
    }

    fn finish(self) -> EffectiveConfig {
        EffectiveConfig {
            files: self.files,
            entrypoint: self
                .entrypoint
                .unwrap_or_else(|| DEFAULT_ENTRYPOINT.to_string()),
            install_dependencies: self.install_dependencies,
        }
    }
}

/// Merge present fragments in order.
pub fn merge_configs<I>(fragments: I) -> EffectiveConfig
where
    I: IntoIterator<Item = PartialConfig>,
{
    fragments
        .into_iter()
        .fold(Merged::default(), Merged::absorb)
        .finish()
}

/// Drop absent fragments, then merge the rest in order.
pub fn merge_present<I>(fragments: I) -> EffectiveConfig
where
    I: IntoIterator<Item = Option<PartialConfig>>,
{
    merge_configs(fragments.into_iter().flatten())
}
