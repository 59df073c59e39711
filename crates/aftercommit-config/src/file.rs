use aftercommit_core::SaturationPolicy;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsFile {
    pub(crate) pool: Option<PoolSection>,
    pub(crate) log: Option<LogSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct PoolSection {
    pub(crate) workers: Option<usize>,
    pub(crate) queue_capacity: Option<usize>,
    pub(crate) saturation: Option<SaturationPolicy>,
    pub(crate) thread_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct LogSection {
    pub(crate) filter: Option<String>,
}
