mod probe;
mod snapshot;

pub(crate) use probe::HealthProbe;
pub(crate) use probe::HealthProbeHandle;
pub(crate) use snapshot::health_table;
pub(crate) use snapshot::HealthSnapshot;
pub(crate) use snapshot::HealthView;
