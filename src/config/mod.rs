mod settings;

pub use settings::{
    BondingSettings, DeploymentSettings, PostgresSettings, RpcSettings, ScannerSettings, Settings,
    StatsSettings,
};
