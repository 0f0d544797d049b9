//! Content-addressed cache for guest shader program translation.
//!
//! Translation is a pure function of the raw program bytes and the
//! backend's feature bits; the bits never change within a process, so the
//! cache keys on a blake3 digest of the bytes alone: a hit is
//! unconditionally correct, entries are never evicted, and nothing is
//! invalidated across runs. Cold lookups fall back to a previously persisted source file
//! before paying for translation; genuinely new programs are translated
//! and their artifacts dumped for offline inspection.
//!
//! Not internally synchronized: the cache is owned and mutated by the
//! renderer thread only (`&mut self` receivers make that a caller
//! obligation enforced at compile time). Translation is a cold path;
//! serializing it behind an internal lock would buy nothing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::backend::FeatureFlags;

/// Pipeline stage a guest program targets; doubles as the persisted file
/// extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }
}

/// Output of one translation run: the usable source plus the auxiliary
/// artifacts persisted for debugging.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Translation {
    pub source: String,
    /// Intermediate binary form (e.g. SPIR-V) the translator went through.
    pub intermediate: Vec<u8>,
    pub disassembly: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("shader translation failed: {0}")]
pub struct TranslateError(pub String);

/// External translation collaborator: a pure function of the program
/// bytes and the backend's capability bits (which shape the generated
/// source but are fixed for the process, so digest keying stays sound).
/// `identifier` is a human-readable name (the digest hex) used in
/// generated source and diagnostics.
pub trait ShaderTranslator: Send {
    fn translate(
        &self,
        program: &[u8],
        identifier: &str,
        features: FeatureFlags,
        debug: bool,
    ) -> Result<Translation, TranslateError>;
}

/// Persistent-storage collaborator for translated shaders.
///
/// Layout: `<base>/shaders/<digest>.<stage>` for adopted sources, and
/// `<base>/shaderlog/<title_id>/<digest>.{<stage>,gxp,dsm,spt}` for the
/// debug dumps written on a translation miss. `title_id` is purely a
/// namespacing key supplied by configuration.
#[derive(Clone, Debug)]
pub struct ShaderStore {
    base: PathBuf,
    title_id: String,
}

impl ShaderStore {
    pub fn new(base: impl Into<PathBuf>, title_id: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            title_id: title_id.into(),
        }
    }

    fn cache_path(&self, digest_hex: &str, stage: ShaderStage) -> PathBuf {
        self.base
            .join("shaders")
            .join(format!("{digest_hex}.{}", stage.extension()))
    }

    fn log_dir(&self) -> PathBuf {
        self.base.join("shaderlog").join(&self.title_id)
    }

    /// Loads a previously persisted source, if one exists for this digest
    /// and stage.
    pub fn load(&self, digest_hex: &str, stage: ShaderStage) -> Option<String> {
        let source = fs::read_to_string(self.cache_path(digest_hex, stage)).ok()?;
        if source.is_empty() {
            return None;
        }
        Some(source)
    }

    /// Persists the program bytes and all translation artifacts of a cache
    /// miss. Storage failures only cost the dump, never the frame, so they
    /// are logged and swallowed.
    pub fn dump_missing(
        &self,
        digest_hex: &str,
        stage: ShaderStage,
        program: &[u8],
        translation: &Translation,
    ) {
        let dir = self.log_dir();
        if let Err(err) = fs::create_dir_all(&dir) {
            warn!(%err, dir = %dir.display(), "cannot create shader log directory");
            return;
        }

        let write = |path: &Path, bytes: &[u8]| {
            if let Err(err) = fs::write(path, bytes) {
                warn!(%err, path = %path.display(), "cannot dump shader artifact");
            }
        };

        write(
            &dir.join(format!("{digest_hex}.{}", stage.extension())),
            translation.source.as_bytes(),
        );
        write(&dir.join(format!("{digest_hex}.gxp")), program);
        write(
            &dir.join(format!("{digest_hex}.dsm")),
            translation.disassembly.as_bytes(),
        );
        write(&dir.join(format!("{digest_hex}.spt")), &translation.intermediate);
    }
}

/// In-memory map from program digest to translated source, with the
/// cold-path fallbacks described in the module docs.
pub struct ShaderCache {
    map: HashMap<blake3::Hash, String>,
    translator: Box<dyn ShaderTranslator>,
    store: ShaderStore,
    debug_translation: bool,
}

impl ShaderCache {
    pub fn new(translator: Box<dyn ShaderTranslator>, store: ShaderStore) -> Self {
        Self {
            map: HashMap::new(),
            translator,
            store,
            debug_translation: false,
        }
    }

    /// Passes `debug = true` through to the translator (richer generated
    /// source, at translation-time cost).
    pub fn set_debug_translation(&mut self, debug: bool) {
        self.debug_translation = debug;
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the translated source for `program`, translating at most
    /// once per distinct program for the process lifetime.
    ///
    /// A failed translation is logged and cached as an empty source:
    /// rendering continues with that program's output missing rather than
    /// aborting the session.
    pub fn get_or_translate(
        &mut self,
        program: &[u8],
        stage: ShaderStage,
        features: FeatureFlags,
    ) -> &str {
        let hash = blake3::hash(program);
        match self.map.entry(hash) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let hex = hash.to_hex();
                let source = match self.store.load(hex.as_str(), stage) {
                    Some(source) => source,
                    None => {
                        info!(?stage, digest = %hex, "translating shader program");
                        match self.translator.translate(
                            program,
                            hex.as_str(),
                            features,
                            self.debug_translation,
                        ) {
                            Ok(translation) => {
                                self.store.dump_missing(hex.as_str(), stage, program, &translation);
                                translation.source
                            }
                            Err(err) => {
                                error!(%err, digest = %hex, "shader translation failed; continuing with degraded output");
                                String::new()
                            }
                        }
                    }
                };
                entry.insert(source)
            }
        }
    }
}
