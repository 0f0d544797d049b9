//! Shader cache behavior against a real (temporary) store directory.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gxm_renderer::{
    FeatureFlags, ShaderCache, ShaderStage, ShaderStore, ShaderTranslator, TranslateError,
    Translation,
};
use pretty_assertions::assert_eq;

const TITLE_ID: &str = "TEST00000";

struct CountingTranslator {
    calls: Arc<AtomicUsize>,
}

impl CountingTranslator {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl ShaderTranslator for CountingTranslator {
    fn translate(
        &self,
        _program: &[u8],
        identifier: &str,
        _features: FeatureFlags,
        _debug: bool,
    ) -> Result<Translation, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Translation {
            source: format!("// {identifier}\nvoid main() {{}}\n"),
            intermediate: vec![0x03, 0x02, 0x23, 0x07],
            disassembly: "mov o0, c0".to_owned(),
        })
    }
}

struct FailingTranslator {
    calls: Arc<AtomicUsize>,
}

impl ShaderTranslator for FailingTranslator {
    fn translate(
        &self,
        _program: &[u8],
        _identifier: &str,
        _features: FeatureFlags,
        _debug: bool,
    ) -> Result<Translation, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TranslateError("unsupported instruction".to_owned()))
    }
}

#[test]
fn each_distinct_program_translates_at_most_once() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (translator, calls) = CountingTranslator::new();
    let mut cache = ShaderCache::new(Box::new(translator), ShaderStore::new(tmp.path(), TITLE_ID));

    let first = cache
        .get_or_translate(b"program-a", ShaderStage::Vertex, FeatureFlags::default())
        .to_owned();
    let second = cache
        .get_or_translate(b"program-a", ShaderStage::Vertex, FeatureFlags::default())
        .to_owned();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    cache.get_or_translate(b"program-b", ShaderStage::Fragment, FeatureFlags::default());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn persisted_source_is_adopted_without_translating() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let program = b"previously-seen program";
    let hex = blake3::hash(program).to_hex();

    let shaders = tmp.path().join("shaders");
    fs::create_dir_all(&shaders).expect("create shaders dir");
    fs::write(shaders.join(format!("{hex}.frag")), "// hand-tuned replacement\n")
        .expect("write persisted source");

    let (translator, calls) = CountingTranslator::new();
    let mut cache = ShaderCache::new(Box::new(translator), ShaderStore::new(tmp.path(), TITLE_ID));

    let source = cache.get_or_translate(program, ShaderStage::Fragment, FeatureFlags::default());
    assert_eq!(source, "// hand-tuned replacement\n");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_persisted_source_is_ignored() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let program = b"program with a truncated dump";
    let hex = blake3::hash(program).to_hex();

    let shaders = tmp.path().join("shaders");
    fs::create_dir_all(&shaders).expect("create shaders dir");
    fs::write(shaders.join(format!("{hex}.vert")), "").expect("write empty source");

    let (translator, calls) = CountingTranslator::new();
    let mut cache = ShaderCache::new(Box::new(translator), ShaderStore::new(tmp.path(), TITLE_ID));

    let source = cache
        .get_or_translate(program, ShaderStage::Vertex, FeatureFlags::default())
        .to_owned();
    assert!(!source.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn translation_miss_dumps_all_artifacts() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let program = b"never seen before";
    let hex = blake3::hash(program).to_hex();

    let (translator, _calls) = CountingTranslator::new();
    let mut cache = ShaderCache::new(Box::new(translator), ShaderStore::new(tmp.path(), TITLE_ID));
    let source = cache
        .get_or_translate(program, ShaderStage::Vertex, FeatureFlags::default())
        .to_owned();

    let dir = tmp.path().join("shaderlog").join(TITLE_ID);
    assert_eq!(
        fs::read_to_string(dir.join(format!("{hex}.vert"))).expect("dumped source"),
        source
    );
    assert_eq!(
        fs::read(dir.join(format!("{hex}.gxp"))).expect("dumped program"),
        program
    );
    assert_eq!(
        fs::read_to_string(dir.join(format!("{hex}.dsm"))).expect("dumped disassembly"),
        "mov o0, c0"
    );
    assert_eq!(
        fs::read(dir.join(format!("{hex}.spt"))).expect("dumped intermediate"),
        vec![0x03, 0x02, 0x23, 0x07]
    );
}

#[test]
fn failed_translation_caches_an_empty_source() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let calls = Arc::new(AtomicUsize::new(0));
    let translator = FailingTranslator {
        calls: Arc::clone(&calls),
    };
    let mut cache = ShaderCache::new(Box::new(translator), ShaderStore::new(tmp.path(), TITLE_ID));

    let features = FeatureFlags::default();
    assert_eq!(cache.get_or_translate(b"bad program", ShaderStage::Fragment, features), "");
    // The failure is cached; the translator is not retried.
    assert_eq!(cache.get_or_translate(b"bad program", ShaderStage::Fragment, features), "");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
