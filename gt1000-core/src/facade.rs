//! Facade: the narrow surface a UI consumes. Owns the transport, the
//! handshake result, the mirror, and its background scheduler; translates
//! user intent into optimistic writes against the mirror.

use std::sync::Arc;

use log::info;

use crate::error::Result;
use crate::handshake::{self, Model as DeviceModel};
use crate::model::{Category, EffectModel};
use crate::mirror::{Mirror, MirrorSnapshot, Scheduler};
use crate::schema::SchemaStore;
use crate::transaction::{Correlator, Transaction};
use crate::transport::{MidiTransport, MidirTransport};

pub struct Gt1000 {
    model: Arc<EffectModel>,
    txn: Arc<Transaction>,
    mirror: Arc<Mirror>,
    scheduler: Scheduler,
    device_model: DeviceModel,
}

impl Gt1000 {
    /// Opens the named MIDI port, runs the handshake, performs the first
    /// synchronous refresh, and starts the background scheduler.
    pub fn open(port_prefix: &str) -> Result<Self> {
        Self::open_with_schema(port_prefix, Arc::new(SchemaStore::load_embedded()?))
    }

    /// Same as `open`, but with an explicit schema bundle (e.g. one loaded
    /// from an override directory via `SchemaStore::load_from_dir`).
    pub fn open_with_schema(port_prefix: &str, schema: Arc<SchemaStore>) -> Result<Self> {
        let correlator = Correlator::new();
        let sink_correlator = correlator.clone();
        let transport = MidirTransport::open(port_prefix, move |frame: &[u8]| sink_correlator.on_inbound_frame(frame))?;
        let transport: Arc<dyn MidiTransport> = Arc::new(transport);

        let (txn, device_model) = handshake::run(transport, correlator)?;
        let txn = Arc::new(txn);
        info!("device ready as {device_model:?}, device id {:#04x}", txn.device_id());

        let model = Arc::new(EffectModel::new(schema, device_model));
        let mirror = Mirror::new();
        mirror.refresh_all(&model, &txn);

        let scheduler = Scheduler::start(model.clone(), txn.clone(), mirror.clone());

        Ok(Self {
            model,
            txn,
            mirror,
            scheduler,
            device_model,
        })
    }

    /// Stops the background scheduler. Outstanding fetches may still run to
    /// their own timeout; this does not abort them.
    pub fn close(&mut self) {
        self.scheduler.stop();
    }

    pub fn device_model(&self) -> DeviceModel {
        self.device_model
    }

    pub fn get_state(&self) -> MirrorSnapshot {
        self.mirror.snapshot()
    }

    pub fn instance_indices(&self, category: Category) -> Vec<String> {
        self.model.instance_indices(category)
    }

    pub fn list_types(&self, category: Category) -> Result<Vec<String>> {
        self.model.list_types(category)
    }

    /// Toggles a switch. Optimistic: stamps the edit timestamp before
    /// issuing the write, then patches the cached view in place so
    /// `get_state` reflects the edit without waiting for a refresh.
    pub fn toggle(&self, category: Category, index: &str, on: bool) -> Result<()> {
        self.mirror.record_action(category);
        self.model.write_switch(&self.txn, category, index, on)?;
        self.mirror.patch_switch(category, index, on);
        Ok(())
    }

    pub fn set_value(&self, category: Category, index: &str, field_label: &str, value: i64) -> Result<()> {
        self.mirror.record_action(category);
        self.model.write_value(&self.txn, category, index, field_label, value)?;
        self.mirror.patch_value(category, index, field_label, value);
        Ok(())
    }

    pub fn set_type(&self, category: Category, index: &str, type_symbol: &str) -> Result<()> {
        self.mirror.record_action(category);
        self.model.write_type(&self.txn, category, index, type_symbol)?;
        self.mirror.patch_type(category, index, type_symbol);
        Ok(())
    }
}

impl Drop for Gt1000 {
    fn drop(&mut self) {
        self.close();
    }
}
