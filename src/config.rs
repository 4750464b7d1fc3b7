//! Component H: persistent config facade (ยง3 `PersistentConfig`, ยง4.H).
//!
//! A thin, single-writer wrapper over an external key/value store. The
//! facade owns serialization and dual-hash validation; callers never see
//! a partially-loaded record (ยง9 "Persistent-config schema").

pub use crate::error::ConfigError;
use packed_struct::prelude::*;

/// Record version understood by this firmware (ยง6 "Persisted state
/// layout"). Any other stored version forces factory defaults.
const LAYER_STATE_VERSION: u8 = 3;

pub const KEY_LAYER_STATE: &str = "layer_state";
pub const KEY_SETTINGS: &str = "settings";

/// External KV store boundary (ยง6 "Persistent KV store").
pub trait KvStore {
    fn read(&mut self, key: &str, out: &mut [u8]) -> Option<usize>;
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
    fn erase(&mut self, key: &str);
}

#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(endian = "msb")]
struct LayerStateRecord {
    base: u8,
    toggle_mask: u32,
    kid_hash: u64,
    lmap_hash: u64,
    version: u8,
}

#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(endian = "msb")]
struct SettingsRecord {
    log_level: u8,
    led_brightness: u8,
}

/// In-memory view of the persisted config (ยง3 `PersistentConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentConfig {
    pub log_level: u8,
    pub led_brightness: u8,
    pub layer_base: u8,
    pub layer_toggles: u32,
    pub keyboard_id_hash: u64,
    pub layers_hash: u64,
}

impl PersistentConfig {
    pub const fn factory_default(keyboard_id_hash: u64, layers_hash: u64) -> Self {
        PersistentConfig {
            log_level: 0,
            led_brightness: 5,
            layer_base: 0,
            layer_toggles: 0,
            keyboard_id_hash,
            layers_hash,
        }
    }
}

/// Compiled-in keymap identity used to validate persisted layer state
/// (ยง4.E persistence contract, ยง4.H).
#[derive(Debug, Clone, Copy)]
pub struct KeymapIdentity {
    pub keyboard_id_hash: u64,
    pub layers_hash: u64,
}

pub struct ConfigFacade<S: KvStore> {
    kv: S,
    identity: KeymapIdentity,
    current: PersistentConfig,
}

impl<S: KvStore> ConfigFacade<S> {
    pub fn new(kv: S, identity: KeymapIdentity) -> Self {
        ConfigFacade {
            kv,
            identity,
            current: PersistentConfig::factory_default(identity.keyboard_id_hash, identity.layers_hash),
        }
    }

    /// `load()`: read both records, validate the layer-state record
    /// against the compiled keymap's identity hashes; on mismatch (or
    /// wrong version) revert just that portion to factory defaults (ยง7
    /// `ConfigMismatch`: "keep other settings").
    pub fn load(&mut self) -> PersistentConfig {
        let mut buf = [0u8; 32];
        let mut cfg =
            PersistentConfig::factory_default(self.identity.keyboard_id_hash, self.identity.layers_hash);

        if let Some(n) = self.kv.read(KEY_SETTINGS, &mut buf) {
            if let Ok(rec) = SettingsRecord::unpack_from_slice(&buf[..n.min(buf.len())]) {
                cfg.log_level = rec.log_level;
                cfg.led_brightness = rec.led_brightness;
            }
        }

        if let Some(n) = self.kv.read(KEY_LAYER_STATE, &mut buf) {
            if let Ok(rec) = LayerStateRecord::unpack_from_slice(&buf[..n.min(buf.len())]) {
                let hashes_ok = rec.kid_hash == self.identity.keyboard_id_hash
                    && rec.lmap_hash == self.identity.layers_hash;
                if rec.version == LAYER_STATE_VERSION && hashes_ok {
                    cfg.layer_base = rec.base;
                    cfg.layer_toggles = rec.toggle_mask;
                }
            }
        }

        self.current = cfg;
        cfg
    }

    /// `store(cfg)`: persist both records; layer state is stamped with the
    /// current compiled-in identity hashes.
    pub fn store(&mut self, cfg: PersistentConfig) -> Result<(), ConfigError> {
        let settings = SettingsRecord {
            log_level: cfg.log_level,
            led_brightness: cfg.led_brightness,
        };
        self.kv.write(KEY_SETTINGS, &settings.pack().map_err(|_| ConfigError::BadVersion)?)?;

        let layer_state = LayerStateRecord {
            base: cfg.layer_base,
            toggle_mask: cfg.layer_toggles,
            kid_hash: self.identity.keyboard_id_hash,
            lmap_hash: self.identity.layers_hash,
            version: LAYER_STATE_VERSION,
        };
        self.kv
            .write(KEY_LAYER_STATE, &layer_state.pack().map_err(|_| ConfigError::BadVersion)?)?;

        self.current = cfg;
        Ok(())
    }

    pub fn get(&self) -> PersistentConfig {
        self.current
    }

    pub fn set(&mut self, cfg: PersistentConfig) -> Result<(), ConfigError> {
        self.store(cfg)
    }
}
