//! Control-side engine controller
//!
//! The UI-facing wrapper around the command handle: it caches the
//! current project patch behind a lock so widgets can read and mutate
//! fields concurrently, and pushes coherent updates to the audio
//! thread. The audio thread never touches this.

use parking_lot::RwLock;

use br_core::{CloudsCommand, CloudsMode, EngineResult, ProjectPatch};

use crate::engine::{EngineCommand, EngineHandle};

pub struct EngineController {
    handle: EngineHandle,
    patch: RwLock<ProjectPatch>,
}

impl EngineController {
    pub fn new(handle: EngineHandle) -> Self {
        Self {
            handle,
            patch: RwLock::new(ProjectPatch::default()),
        }
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut EngineHandle {
        &mut self.handle
    }

    /// Load a patch from JSON and push it to the audio thread.
    pub fn load_json(&self, json: &str) -> EngineResult<()> {
        let patch = ProjectPatch::from_json(json)?;
        self.handle
            .send(EngineCommand::ApplyPatch(Box::new(patch.clone())));
        *self.patch.write() = patch;
        Ok(())
    }

    /// Serialize the current patch.
    pub fn save_json(&self) -> EngineResult<String> {
        self.patch.read().to_json()
    }

    /// Mutate the cached patch and resend it whole. Coarse but always
    /// coherent; knob-rate changes go through the dedicated commands
    /// instead.
    pub fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ProjectPatch),
    {
        let mut patch = self.patch.write();
        mutate(&mut patch);
        self.handle
            .send(EngineCommand::ApplyPatch(Box::new(patch.clone())));
    }

    pub fn with_patch<T>(&self, read: impl FnOnce(&ProjectPatch) -> T) -> T {
        read(&self.patch.read())
    }

    /// Select a clouds mode by raw index. Unknown indices warn here and
    /// fall back to granular; the audio thread never sees them.
    pub fn set_clouds_mode_index(&self, index: u32) {
        let mode = CloudsMode::from_index(index).unwrap_or_else(|| {
            log::warn!("unknown clouds mode index {index}, falling back to granular");
            CloudsMode::Granular
        });
        self.patch.write().clouds.mode = mode;
        self.handle
            .send(EngineCommand::Clouds(CloudsCommand::SetMode(mode)));
    }
}
