//! Parallel processing of a directory of images.
//!
//! Walks the input directory, keeps every file whose extension the engine can
//! decode, and runs one pipeline per file on the rayon pool. Each result is
//! written to `<output>/<relative dir>/<stem>.<ext>`, mirroring the input
//! tree, where `<ext>` is the requested output format's extension.
//!
//! ## Progress
//!
//! Callers pass an optional `Sender<BatchEvent>`; one event is sent per file as
//! soon as it finishes, from whichever worker finished it. The CLI drains the
//! channel on a printer thread.
//!
//! A failing file never stops the batch: its error is reported as an event and
//! counted in the summary. The same goes for entries the walk cannot read
//! below the input root, and for inputs whose output path is already claimed
//! by an earlier input (`a.jpg` and `a.png` both mapping to `a.webp`).

use crate::deadline::Deadline;
use crate::imaging::capabilities::CapabilityRegistry;
use crate::imaging::engine::ImageEngine;
use crate::options::{ImageFormat, ProcessingOptions, Quality};
use crate::pipeline::{PipelineError, process_image_with_engine};
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{path}: output {output} is already written by {first}")]
    OutputConflict {
        path: PathBuf,
        output: PathBuf,
        first: PathBuf,
    },
    #[error("{path}: {source}")]
    Pipeline {
        path: PathBuf,
        #[source]
        source: PipelineError,
    },
}

/// Settings shared by every file in a batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub options: ProcessingOptions,
    pub quality: Quality,
    /// Per-file deadline; `None` disables it.
    pub timeout: Option<Duration>,
}

/// Progress event, one per input file.
#[derive(Debug)]
pub enum BatchEvent {
    Processed {
        source: PathBuf,
        output: PathBuf,
        bytes: usize,
        elapsed: Duration,
    },
    Failed {
        source: PathBuf,
        error: String,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.processed + self.failed
    }
}

/// Result of walking the input directory.
#[derive(Debug, Default)]
pub struct BatchInputs {
    /// Decodable files, sorted by path.
    pub files: Vec<(PathBuf, ImageFormat)>,
    /// Entries below the root the walk could not read.
    pub unreadable: Vec<(PathBuf, walkdir::Error)>,
}

/// Files under `input` the registry can decode.
///
/// Only a failure on `input` itself is an error.
pub fn collect_inputs(input: &Path, registry: &CapabilityRegistry) -> Result<BatchInputs, BatchError> {
    let mut inputs = BatchInputs::default();
    for entry in WalkDir::new(input).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| input.to_path_buf());
                inputs.unreadable.push((path, e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let format = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension);
        if let Some(format) = format.filter(|f| registry.can_decode(*f)) {
            inputs.files.push((entry.into_path(), format));
        }
    }
    inputs.files.sort();
    Ok(inputs)
}

/// Output path for `source`: its directory relative to `input`, its file stem
/// and the output format's extension.
pub fn output_path(source: &Path, input: &Path, output_dir: &Path, format: ImageFormat) -> PathBuf {
    let relative_dir = source
        .strip_prefix(input)
        .ok()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    output_dir
        .join(relative_dir)
        .join(format!("{stem}.{}", format.extension()))
}

struct Job {
    source: PathBuf,
    format: ImageFormat,
    output: PathBuf,
}

/// Assign output paths; the first input (in path order) keeps a contested one.
fn plan_jobs(
    files: Vec<(PathBuf, ImageFormat)>,
    input: &Path,
    output_dir: &Path,
    format: ImageFormat,
) -> (Vec<Job>, Vec<(PathBuf, BatchError)>) {
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut jobs = Vec::with_capacity(files.len());
    let mut conflicts = Vec::new();
    for (source, source_format) in files {
        let output = output_path(&source, input, output_dir, format);
        match claimed.entry(output) {
            Entry::Occupied(first) => {
                let error = BatchError::OutputConflict {
                    path: source.clone(),
                    output: first.key().clone(),
                    first: first.get().clone(),
                };
                conflicts.push((source, error));
            }
            Entry::Vacant(slot) => {
                jobs.push(Job {
                    source: source.clone(),
                    format: source_format,
                    output: slot.key().clone(),
                });
                slot.insert(source);
            }
        }
    }
    (jobs, conflicts)
}

fn process_file<E: ImageEngine>(
    engine: &E,
    registry: &CapabilityRegistry,
    job: &Job,
    settings: &BatchSettings,
) -> Result<usize, BatchError> {
    let data = std::fs::read(&job.source)?;
    // Trust the magic bytes over the extension when they disagree.
    let format = ImageFormat::sniff(&data).unwrap_or(job.format);
    let deadline = Deadline::from_timeout(settings.timeout);

    let encoded = process_image_with_engine(
        engine,
        registry,
        &data,
        format,
        &settings.options,
        settings.quality,
        &deadline,
    )
    .map_err(|source_err| BatchError::Pipeline {
        path: job.source.clone(),
        source: source_err,
    })?;

    if let Some(parent) = job.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&job.output, &encoded)?;
    Ok(encoded.len())
}

fn failed(source: PathBuf, error: &BatchError) -> BatchEvent {
    warn!(source = %source.display(), %error, "image failed");
    BatchEvent::Failed {
        source,
        error: error.to_string(),
    }
}

/// Process every decodable file under `input` into `output_dir`.
///
/// Returns `Err` only when the batch cannot start (unreadable input
/// directory, output directory not creatable). Per-file failures, unreadable
/// entries below the root and output path conflicts are counted.
pub fn run_batch<E: ImageEngine>(
    engine: &E,
    registry: &CapabilityRegistry,
    input: &Path,
    output_dir: &Path,
    settings: &BatchSettings,
    progress: Option<Sender<BatchEvent>>,
) -> Result<BatchSummary, BatchError> {
    let started = Instant::now();
    let inputs = collect_inputs(input, registry)?;
    std::fs::create_dir_all(output_dir)?;
    info!(
        files = inputs.files.len(),
        unreadable = inputs.unreadable.len(),
        input = %input.display(),
        "batch started"
    );

    let (jobs, conflicts) = plan_jobs(inputs.files, input, output_dir, settings.options.format);
    let mut rejected: Vec<BatchEvent> = inputs
        .unreadable
        .into_iter()
        .map(|(path, e)| failed(path, &BatchError::Walk(e)))
        .collect();
    rejected.extend(conflicts.into_iter().map(|(path, e)| failed(path, &e)));
    let rejected_count = rejected.len();
    if let Some(tx) = &progress {
        for event in rejected {
            let _ = tx.send(event);
        }
    }

    let results: Vec<bool> = jobs
        .par_iter()
        .map_with(progress, |progress, job| {
            let file_started = Instant::now();
            let (ok, event) = match process_file(engine, registry, job, settings) {
                Ok(bytes) => (
                    true,
                    BatchEvent::Processed {
                        source: job.source.clone(),
                        output: job.output.clone(),
                        bytes,
                        elapsed: file_started.elapsed(),
                    },
                ),
                Err(e) => (false, failed(job.source.clone(), &e)),
            };
            if let Some(tx) = progress {
                // Receiver gone means nobody is listening; keep working.
                let _ = tx.send(event);
            }
            ok
        })
        .collect();

    let processed = results.iter().filter(|ok| **ok).count();
    let summary = BatchSummary {
        processed,
        failed: results.len() - processed + rejected_count,
        elapsed: started.elapsed(),
    };
    info!(
        processed = summary.processed,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::engine::tests::MockEngine;
    use crate::options::ResizeMode;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn settings() -> BatchSettings {
        BatchSettings {
            options: ProcessingOptions::new(ResizeMode::Fit, 100, 100, ImageFormat::Png),
            quality: Quality::default(),
            timeout: None,
        }
    }

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"fake").unwrap();
    }

    #[test]
    fn collect_inputs_filters_by_extension() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.jpg");
        touch(tmp.path(), "a.PNG");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), "nested/c.webp");

        let engine = MockEngine::new(10, 10);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let inputs = collect_inputs(tmp.path(), &registry).unwrap();

        assert!(inputs.unreadable.is_empty());
        let names: Vec<_> = inputs
            .files
            .iter()
            .map(|(p, f)| {
                (
                    p.strip_prefix(tmp.path()).unwrap().to_path_buf(),
                    *f,
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                (PathBuf::from("a.PNG"), ImageFormat::Png),
                (PathBuf::from("b.jpg"), ImageFormat::Jpeg),
                (PathBuf::from("nested/c.webp"), ImageFormat::Webp),
            ]
        );
    }

    #[test]
    fn output_path_uses_target_extension() {
        let out = output_path(
            Path::new("/in/photo.png"),
            Path::new("/in"),
            Path::new("/out"),
            ImageFormat::Jpeg,
        );
        assert_eq!(out, PathBuf::from("/out/photo.jpg"));
    }

    #[test]
    fn output_path_mirrors_subdirectories() {
        let out = output_path(
            Path::new("/in/2024/june/photo.png"),
            Path::new("/in"),
            Path::new("/out"),
            ImageFormat::Webp,
        );
        assert_eq!(out, PathBuf::from("/out/2024/june/photo.webp"));
    }

    #[test]
    fn same_name_in_subdirectory_gets_its_own_output() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        touch(&input, "a.jpg");
        touch(&input, "sub/a.jpg");

        let engine = MockEngine::new(400, 200);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let summary = run_batch(&engine, &registry, &input, &output, &settings(), None).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 0);
        assert!(output.join("a.png").is_file());
        assert!(output.join("sub/a.png").is_file());
    }

    #[test]
    fn contested_output_path_fails_the_later_input() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        touch(&input, "a.jpg");
        touch(&input, "a.png");

        let engine = MockEngine::new(400, 200);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let (tx, rx) = mpsc::channel();
        let summary =
            run_batch(&engine, &registry, &input, &output, &settings(), Some(tx)).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        let events: Vec<BatchEvent> = rx.iter().collect();
        let failure = events
            .iter()
            .find_map(|e| match e {
                BatchEvent::Failed { source, error } => Some((source.clone(), error.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(failure.0, input.join("a.png"));
        assert!(failure.1.contains("a.jpg"), "{}", failure.1);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entry_below_root_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        touch(&input, "one.jpg");
        // Following this link would walk forever; walkdir reports it as a loop.
        std::os::unix::fs::symlink(&input, input.join("loop")).unwrap();

        let engine = MockEngine::new(400, 200);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let (tx, rx) = mpsc::channel();
        let summary = run_batch(
            &engine,
            &registry,
            &input,
            &tmp.path().join("out"),
            &settings(),
            Some(tx),
        )
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        assert!(rx.iter().any(|e| matches!(
            e,
            BatchEvent::Failed { source, .. } if source == input.join("loop")
        )));
    }

    #[test]
    fn batch_writes_outputs_and_reports_events() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        touch(&input, "one.jpg");
        touch(&input, "two.png");

        let engine = MockEngine::new(400, 200);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let (tx, rx) = mpsc::channel();

        let summary =
            run_batch(&engine, &registry, &input, &output, &settings(), Some(tx)).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(fs::read(output.join("one.png")).unwrap(), b"png:100x50");
        assert!(output.join("two.png").exists());

        let events: Vec<BatchEvent> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert!(
            events
                .iter()
                .all(|e| matches!(e, BatchEvent::Processed { bytes: 10, .. }))
        );
    }

    #[test]
    fn failing_file_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bad.jpg");

        let engine = MockEngine::new(400, 200).failing_on("decode");
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let (tx, rx) = mpsc::channel();

        let summary = run_batch(
            &engine,
            &registry,
            tmp.path(),
            &tmp.path().join("out"),
            &settings(),
            Some(tx),
        )
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 1);
        let event = rx.recv().unwrap();
        assert!(matches!(event, BatchEvent::Failed { error, .. } if error.contains("bad.jpg")));
    }

    #[test]
    fn missing_input_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        let engine = MockEngine::new(10, 10);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let result = run_batch(
            &engine,
            &registry,
            &tmp.path().join("nope"),
            &tmp.path().join("out"),
            &settings(),
            None,
        );
        assert!(matches!(result, Err(BatchError::Walk(_))));
    }
}
