use crate::data::{Config, SessionTable};
use crate::userplane::{CoreId, FlowSteering};

/// Trait representing the collection of services needed by the PFCP procedures.
pub trait HandlerApi: Send + Sync + Clone + 'static {
    fn config(&self) -> &Config;

    fn sessions(&self) -> &SessionTable;

    fn steering(&self) -> &FlowSteering;

    /// When this UPF started, in seconds since 1900.
    fn recovery_time_stamp(&self) -> u32;

    fn allocate_seid(&self) -> u64;

    /// A free uplink TEID that steers to `core`.
    fn allocate_uplink_teid(&self, core: CoreId) -> Option<u32> {
        self.steering()
            .allocate_teid(core, &mut rand::rng(), |teid| {
                self.sessions().lookup_by_teid(teid).is_some()
            })
    }
}
