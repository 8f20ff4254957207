//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use layerkit::{
    CancellationToken, ConversionParams, DirManifestStore, FormatConverter, LayerError, Manifest, ModelArchitecture,
    ProgressEvent, ProgressFn, PullOptions, RemotePuller, Result,
};

/// Writes a little-endian GGUF v3 document with tensors in the given order.
pub struct GgufBuilder {
    seed: u8,
    kvs: Vec<(String, String)>,
    tensors: Vec<(String, Vec<u64>)>,
}

impl GgufBuilder {
    pub fn new() -> Self {
        Self {
            seed: 0,
            kvs: Vec::new(),
            tensors: Vec::new(),
        }
    }

    pub fn seed(mut self, seed: u8) -> Self {
        self.seed = seed;
        self
    }

    pub fn kv(mut self, key: &str, value: &str) -> Self {
        self.kvs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn architecture(self, arch: &str) -> Self {
        self.kv("general.architecture", arch)
    }

    /// An F32 tensor with deterministic payload bytes.
    pub fn tensor(mut self, name: &str, shape: &[u64]) -> Self {
        self.tensors.push((name.to_string(), shape.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        fn string(out: &mut Vec<u8>, s: &str) {
            out.extend_from_slice(&(s.len() as u64).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        fn align(n: u64) -> u64 {
            n.div_ceil(32) * 32
        }

        let mut out = b"GGUF".to_vec();
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&(self.tensors.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.kvs.len() as u64).to_le_bytes());
        for (key, value) in &self.kvs {
            string(&mut out, key);
            out.extend_from_slice(&8u32.to_le_bytes());
            string(&mut out, value);
        }

        let mut offset = 0u64;
        let mut payloads = Vec::new();
        for (index, (name, shape)) in self.tensors.iter().enumerate() {
            let elements: u64 = shape.iter().product();
            offset = align(offset);
            string(&mut out, name);
            out.extend_from_slice(&(shape.len() as u32).to_le_bytes());
            for dim in shape {
                out.extend_from_slice(&dim.to_le_bytes());
            }
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());

            let data: Vec<u8> = (0..elements * 4)
                .map(|i| (i as u8).wrapping_add(self.seed).wrapping_mul(index as u8 + 3))
                .collect();
            payloads.push((offset, data));
            offset += elements * 4;
        }

        let data_start = align(out.len() as u64);
        for (offset, data) in payloads {
            out.resize((data_start + offset) as usize, 0);
            out.extend_from_slice(&data);
        }
        if out.len() < data_start as usize {
            out.resize(data_start as usize, 0);
        }
        out
    }
}

impl Default for GgufBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an in-memory zip archive.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A minimal checkpoint directory as a zip archive.
pub fn checkpoint_zip() -> Vec<u8> {
    build_zip(&[
        (
            "config.json",
            br#"{"architectures": ["LlamaForCausalLM"], "vocab_size": 8}"#,
        ),
        ("model.safetensors", b"\x00\x01\x02\x03"),
        ("tokenizer.json", b"{}"),
    ])
}

/// Collects progress statuses in arrival order.
pub fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |event: ProgressEvent| {
        sink.lock().unwrap().push(event.status);
    });
    (progress, seen)
}

/// Converter that emits a fixed GGUF document and counts invocations.
pub struct StubConverter {
    output: Vec<u8>,
    delay: Duration,
    cancel_on_open: Option<CancellationToken>,
    params_reads: Arc<AtomicUsize>,
    pub calls: AtomicUsize,
}

impl StubConverter {
    pub fn new(output: Vec<u8>) -> Self {
        Self {
            output,
            delay: Duration::ZERO,
            cancel_on_open: None,
            params_reads: Arc::new(AtomicUsize::new(0)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Cancel `token` once the checkpoint has been extracted and opened.
    pub fn cancelling_on_open(mut self, token: CancellationToken) -> Self {
        self.cancel_on_open = Some(token);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How often the importer asked an opened checkpoint for its params.
    pub fn params_reads(&self) -> usize {
        self.params_reads.load(Ordering::SeqCst)
    }
}

impl FormatConverter for StubConverter {
    fn open(&self, dir: &Path) -> Result<Box<dyn ModelArchitecture>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if let Some(token) = &self.cancel_on_open {
            token.cancel();
        }
        let params = ConversionParams::from_dir(dir)?;
        if !dir.join("model.safetensors").is_file() {
            return Err(LayerError::Conversion {
                message: "no weights in checkpoint".into(),
            });
        }
        Ok(Box::new(StubArchitecture {
            params,
            params_reads: self.params_reads.clone(),
            output: self.output.clone(),
            tensors_loaded: false,
            vocab_loaded: false,
        }))
    }
}

struct StubArchitecture {
    params: ConversionParams,
    params_reads: Arc<AtomicUsize>,
    output: Vec<u8>,
    tensors_loaded: bool,
    vocab_loaded: bool,
}

impl ModelArchitecture for StubArchitecture {
    fn params(&self) -> &ConversionParams {
        self.params_reads.fetch_add(1, Ordering::SeqCst);
        &self.params
    }

    fn load_tensors(&mut self) -> Result<()> {
        self.tensors_loaded = true;
        Ok(())
    }

    fn load_vocab(&mut self) -> Result<()> {
        self.vocab_loaded = true;
        Ok(())
    }

    fn write_gguf(&mut self, out: &mut dyn Write) -> Result<()> {
        if !self.tensors_loaded || !self.vocab_loaded {
            return Err(LayerError::Conversion {
                message: "write before load".into(),
            });
        }
        out.write_all(&self.output)?;
        Ok(())
    }
}

/// How a [`StubPuller`] responds.
pub enum PullBehavior {
    /// Save this manifest locally, as a real pull would.
    Save(Manifest),
    /// Fail with a pull error.
    Fail,
    /// Never complete.
    Hang,
}

pub struct StubPuller {
    manifests: DirManifestStore,
    behavior: PullBehavior,
    pub calls: AtomicUsize,
}

impl StubPuller {
    pub fn new(manifests: DirManifestStore, behavior: PullBehavior) -> Self {
        Self {
            manifests,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemotePuller for StubPuller {
    async fn pull(&self, name: &str, _options: &PullOptions, progress: ProgressFn) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress(ProgressEvent::new(format!("pulling {name}")));
        match &self.behavior {
            PullBehavior::Save(manifest) => self.manifests.save(name, manifest),
            PullBehavior::Fail => Err(LayerError::Pull {
                name: name.to_string(),
                message: "registry unreachable".into(),
            }),
            PullBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
