//! The master contract consumed by the cyclic engine.

use ecat_common::error::Result;

use crate::pdo::{PdoEntry, PdoOffset};
use crate::slave::{SlaveInfo, SlaveState};

/// Abstract interface for an EtherCAT master.
///
/// The master owns the network interface and the process image, and
/// coordinates cyclic process data exchange with slaves. The lifecycle
/// follows EtherCAT state machine conventions:
///
/// 1. `initialize()` - scan the bus, enumerate slaves
/// 2. `register_pdos()` - declare the entry set for cyclic exchange,
///    once between initialize and activate
/// 3. `activate()` - transition slaves to OPERATIONAL, fix the image layout
/// 4. Cyclic loop: `receive()` → read inputs → write outputs → `send()`
/// 5. `deactivate()` - stop cyclic operation, return slaves to INIT
///
/// `receive`/`send` must be called from a single thread. Image sizes and
/// PDO offsets are fixed between `activate` and `deactivate`.
pub trait Master: Send {
    /// Initializes the master and scans the network.
    ///
    /// Idempotent after `deactivate`. After success, [`Master::slaves`]
    /// reports the discovered topology.
    fn initialize(&mut self) -> Result<()>;

    /// Registers the PDO entries to exchange cyclically.
    ///
    /// Called once between `initialize` and `activate`; a later
    /// registration replaces the previous set.
    fn register_pdos(&mut self, entries: &[PdoEntry]) -> Result<()>;

    /// Activates the master and transitions slaves to OPERATIONAL.
    ///
    /// After activation the image layout is fixed and cyclic exchange may
    /// begin.
    fn activate(&mut self) -> Result<()>;

    /// Deactivates the master and stops cyclic communication. Idempotent.
    fn deactivate(&mut self);

    /// Receives and processes input datagrams for the current cycle.
    ///
    /// After this call the bytes returned by [`Master::input_data`] are
    /// valid for the cycle. Errors are transient-tolerant.
    fn receive(&mut self) -> Result<()>;

    /// Queues the current output image and transmits it to the slaves.
    fn send(&mut self) -> Result<()>;

    /// The input process image (TxPDO data). Empty before activation.
    fn input_data(&self) -> &[u8];

    /// The output process image (RxPDO data). Empty before activation.
    fn output_data(&mut self) -> &mut [u8];

    /// Resolves a registered entry to its `(byte, bit)` offset within the
    /// image for its direction. Stable between `activate` and `deactivate`.
    fn pdo_offset(&self, entry: &PdoEntry) -> Option<PdoOffset>;

    /// Slaves discovered during initialization, ordered by bus position.
    fn slaves(&self) -> Vec<SlaveInfo>;

    /// Current application layer state of the slave at `position`.
    fn slave_state(&self, position: u16) -> SlaveState;

    /// Name of the network interface this master is bound to.
    fn interface_name(&self) -> &str;
}

/// Factory producing masters for `(interface, backend)` pairs.
pub type MasterFactory = Box<dyn Fn(&str, &str) -> Result<Box<dyn Master>> + Send + Sync>;
