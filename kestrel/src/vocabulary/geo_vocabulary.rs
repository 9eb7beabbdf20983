/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! A vocabulary for WKT literals with a sidecar file of `GeometryInfo`
//! records, one per literal and in the order of the literals.
//!
//! While writing, the geometry infos are computed by a pool of worker threads.
//! A single writer thread puts the results back into insertion order:
//!
//! ```text
//! append() --bounded queue--> workers --results--> writer (reorder by index) --> <file>.geoinfo
//! ```

use super::geometry_info::{GeometryInfo, GEOMETRY_INFO_SIZE, GEOMETRY_INFO_VERSION};
use super::{UnderlyingVocabulary, WordWriter};
use crate::error::{EngineError, Result};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use log::{error, warn};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

const HEADER_SIZE: u64 = std::mem::size_of::<u64>() as u64;
const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Sizing of the preprocessing pipeline of a `GeoWordWriter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoWriterConfig {
    pub num_workers: usize,
    pub queue_capacity: usize,
}

impl Default for GeoWriterConfig {
    fn default() -> Self {
        GeoWriterConfig {
            num_workers: thread::available_parallelism().map_or(1, |n| n.get()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Counters reported when a `GeoWordWriter` is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeoWriterStatistics {
    pub num_written: u64,
    pub num_invalid_geometries: u64,
    pub num_invalid_polygon_areas: u64,
}

pub fn geo_info_filename(filename: &Path) -> PathBuf {
    let mut name = OsString::from(filename.as_os_str());
    name.push(".geoinfo");
    PathBuf::from(name)
}

/// Wraps an underlying vocabulary and adds a `GeometryInfo` per word.
pub struct GeoVocabulary<V> {
    literals: V,
    geo_info_file: Option<Mutex<File>>,
    num_geo_infos: u64,
}

impl<V: UnderlyingVocabulary> GeoVocabulary<V> {
    pub fn new(literals: V) -> Self {
        GeoVocabulary {
            literals,
            geo_info_file: None,
            num_geo_infos: 0,
        }
    }

    pub fn literals(&self) -> &V {
        &self.literals
    }

    pub fn size(&self) -> usize {
        self.literals.size()
    }

    pub fn word(&self, index: u64) -> Option<&str> {
        self.literals.word(index)
    }

    pub fn lower_bound(&self, word: &str) -> u64 {
        self.literals.lower_bound(word)
    }

    /// Opens the literals and the sidecar file. Fails if the sidecar was
    /// written with a different `GEOMETRY_INFO_VERSION`.
    pub fn open(&mut self, filename: &Path) -> Result<()> {
        self.literals.open(filename)?;
        let sidecar = geo_info_filename(filename);
        let mut file = File::open(&sidecar)?;
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let version = u64::from_le_bytes(header);
        if version != GEOMETRY_INFO_VERSION {
            return Err(EngineError::IncompatibleFormat(format!(
                "The geometry info version of {} is {}, which is incompatible with version {} \
                 as required by this version of kestrel. Please rebuild your index.",
                sidecar.display(),
                version,
                GEOMETRY_INFO_VERSION
            )));
        }
        let length = file.metadata()?.len();
        self.num_geo_infos = (length - HEADER_SIZE) / GEOMETRY_INFO_SIZE as u64;
        self.geo_info_file = Some(Mutex::new(file));
        Ok(())
    }

    /// The precomputed info of the literal with the given index, or `None`
    /// if the literal is not a valid geometry.
    pub fn get_geo_info(&self, index: u64) -> Result<Option<GeometryInfo>> {
        let file = self.geo_info_file.as_ref().ok_or_else(|| {
            EngineError::PreconditionViolation("the geo vocabulary has not been opened".to_string())
        })?;
        if index >= self.num_geo_infos {
            return Err(EngineError::PreconditionViolation(format!(
                "geometry info index {} is out of range, the vocabulary has {} entries",
                index, self.num_geo_infos
            )));
        }
        let mut buffer = [0u8; GEOMETRY_INFO_SIZE];
        {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            file.seek(SeekFrom::Start(HEADER_SIZE + index * GEOMETRY_INFO_SIZE as u64))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(GeometryInfo::from_bytes(&buffer))
    }

    pub fn make_disk_writer(
        &self,
        filename: &Path,
        config: GeoWriterConfig,
    ) -> Result<GeoWordWriter<V::Writer>> {
        GeoWordWriter::new(self.literals.make_disk_writer(filename)?, filename, config)
    }
}

struct WorkItem {
    index: u64,
    word: String,
}

struct GeoResult {
    index: u64,
    info: Option<GeometryInfo>,
}

/// Writer that forwards words to the underlying vocabulary writer and
/// computes their geometry infos in parallel.
pub struct GeoWordWriter<W: WordWriter> {
    underlying: W,
    work_sender: Option<Sender<WorkItem>>,
    workers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<Result<GeoWriterStatistics>>>,
    num_appended: u64,
    statistics: Option<GeoWriterStatistics>,
    finished: bool,
    /// Set when the underlying vocabulary and the sidecar went out of sync.
    failure: Option<String>,
}

impl<W: WordWriter> GeoWordWriter<W> {
    pub fn new(underlying: W, filename: &Path, config: GeoWriterConfig) -> Result<Self> {
        let mut file = File::create(geo_info_filename(filename))?;
        file.write_all(&GEOMETRY_INFO_VERSION.to_le_bytes())?;

        let (work_sender, work_receiver) = bounded::<WorkItem>(config.queue_capacity.max(1));
        let (result_sender, result_receiver) = unbounded::<GeoResult>();
        let workers = (0..config.num_workers.max(1))
            .map(|_| {
                let work = work_receiver.clone();
                let results = result_sender.clone();
                thread::spawn(move || process_work(work, results))
            })
            .collect();
        // Workers hold the remaining senders; the writer stops once they exit.
        drop(result_sender);
        let writer = thread::spawn(move || write_geo_infos(file, result_receiver));

        Ok(GeoWordWriter {
            underlying,
            work_sender: Some(work_sender),
            workers,
            writer: Some(writer),
            num_appended: 0,
            statistics: None,
            finished: false,
            failure: None,
        })
    }

    /// The counters of the finished writer.
    pub fn statistics(&self) -> Option<GeoWriterStatistics> {
        self.statistics
    }

    /// Stops the pipeline, writes all pending records and finishes the
    /// underlying writer. Warns about invalid geometries.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        drop(self.work_sender.take());

        let mut result = Ok(());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() && result.is_ok() {
                result = Err(EngineError::PreconditionViolation(
                    "a geometry preprocessing worker panicked".to_string(),
                ));
            }
        }
        let statistics = match self.writer.take().map(|w| w.join()) {
            Some(Ok(statistics)) => statistics,
            Some(Err(_)) => Err(EngineError::PreconditionViolation(
                "the geometry info writer thread panicked".to_string(),
            )),
            None => Ok(GeoWriterStatistics::default()),
        };
        let underlying = self.underlying.finish();
        if let Some(failure) = &self.failure {
            return Err(EngineError::PreconditionViolation(format!(
                "the geo vocabulary is incomplete: {}",
                failure
            )));
        }
        result?;
        let statistics = statistics?;
        underlying?;

        if statistics.num_invalid_geometries > 0 {
            warn!(
                "Geometry preprocessing skipped {} invalid WKT literal{}",
                statistics.num_invalid_geometries,
                if statistics.num_invalid_geometries == 1 { "" } else { "s" }
            );
        }
        if statistics.num_invalid_polygon_areas > 0 {
            warn!(
                "Geometry preprocessing could not compute the area for {} malformed polygon geometr{}",
                statistics.num_invalid_polygon_areas,
                if statistics.num_invalid_polygon_areas == 1 { "y" } else { "ies" }
            );
        }
        self.statistics = Some(statistics);
        Ok(())
    }
}

impl<W: WordWriter> WordWriter for GeoWordWriter<W> {
    fn append(&mut self, word: &str, is_external: bool) -> Result<u64> {
        if let Some(failure) = &self.failure {
            return Err(EngineError::PreconditionViolation(failure.clone()));
        }
        let sender = self.work_sender.as_ref().ok_or_else(|| {
            EngineError::PreconditionViolation("the geo vocabulary writer is finished".to_string())
        })?;
        let index = self.underlying.append(word, is_external)?;
        if index != self.num_appended {
            let failure = format!(
                "the underlying vocabulary returned index {}, expected {}",
                index, self.num_appended
            );
            self.failure = Some(failure.clone());
            return Err(EngineError::PreconditionViolation(failure));
        }
        self.num_appended += 1;
        sender
            .send(WorkItem {
                index,
                word: word.to_string(),
            })
            .map_err(|_| {
                EngineError::PreconditionViolation(
                    "the geometry preprocessing pipeline stopped unexpectedly".to_string(),
                )
            })?;
        Ok(index)
    }

    fn finish(&mut self) -> Result<()> {
        GeoWordWriter::finish(self)
    }
}

impl<W: WordWriter> Drop for GeoWordWriter<W> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.finish() {
            error!("Finishing the geo vocabulary writer failed: {}", err);
            // An append already reported this failure to the caller.
            if self.failure.is_none() {
                std::process::abort();
            }
        }
    }
}

fn process_work(work: Receiver<WorkItem>, results: Sender<GeoResult>) {
    for item in work.iter() {
        let result = GeoResult {
            index: item.index,
            info: GeometryInfo::from_wkt_literal(&item.word),
        };
        if results.send(result).is_err() {
            // The writer is gone, nothing left to do.
            return;
        }
    }
}

fn write_geo_infos(file: File, results: Receiver<GeoResult>) -> Result<GeoWriterStatistics> {
    let mut out = BufWriter::new(file);
    let mut pending: BTreeMap<u64, Option<GeometryInfo>> = BTreeMap::new();
    let mut statistics = GeoWriterStatistics::default();
    let invalid = [0u8; GEOMETRY_INFO_SIZE];

    for result in results.iter() {
        pending.insert(result.index, result.info);
        while let Some(info) = pending.remove(&statistics.num_written) {
            match info {
                Some(info) => {
                    if !info.metric_area().is_valid() {
                        statistics.num_invalid_polygon_areas += 1;
                    }
                    out.write_all(&info.to_bytes())?;
                }
                None => {
                    statistics.num_invalid_geometries += 1;
                    out.write_all(&invalid)?;
                }
            }
            statistics.num_written += 1;
        }
    }
    if !pending.is_empty() {
        return Err(EngineError::PreconditionViolation(format!(
            "geometry info {} was never computed, {} results are stuck behind it",
            statistics.num_written,
            pending.len()
        )));
    }
    out.flush()?;
    Ok(statistics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VocabularyInMemory;

    fn write_words(dir: &Path, words: &[&str], config: GeoWriterConfig) -> GeoWriterStatistics {
        let filename = dir.join("geo");
        let vocab = GeoVocabulary::new(VocabularyInMemory::new());
        let mut writer = vocab.make_disk_writer(&filename, config).unwrap();
        for (i, word) in words.iter().enumerate() {
            assert_eq!(writer.append(word, false).unwrap(), i as u64);
        }
        writer.finish().unwrap();
        writer.statistics().unwrap()
    }

    #[test]
    fn test_records_are_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeoWriterConfig {
            num_workers: 4,
            queue_capacity: 2,
        };
        let statistics = write_words(dir.path(), &["POINT(0 0)", "GARBAGE", "POINT(1 1)"], config);
        assert_eq!(statistics.num_written, 3);
        assert_eq!(statistics.num_invalid_geometries, 1);
        assert_eq!(statistics.num_invalid_polygon_areas, 0);

        let bytes = std::fs::read(geo_info_filename(&dir.path().join("geo"))).unwrap();
        assert_eq!(bytes.len(), 8 + 3 * GEOMETRY_INFO_SIZE);
        assert_eq!(bytes[..8], GEOMETRY_INFO_VERSION.to_le_bytes());
        let record = |k: usize| &bytes[8 + k * GEOMETRY_INFO_SIZE..8 + (k + 1) * GEOMETRY_INFO_SIZE];
        let point = |wkt: &str| GeometryInfo::from_wkt_literal(wkt).unwrap().to_bytes();
        assert_eq!(record(0), point("POINT(0 0)"));
        assert_eq!(record(1), [0u8; GEOMETRY_INFO_SIZE]);
        assert_eq!(record(2), point("POINT(1 1)"));

        let mut vocab = GeoVocabulary::new(VocabularyInMemory::new());
        vocab.open(&dir.path().join("geo")).unwrap();
        assert_eq!(vocab.size(), 3);
        assert_eq!(vocab.word(1), Some("GARBAGE"));
        assert_eq!(vocab.get_geo_info(1).unwrap(), None);
        assert_eq!(
            vocab.get_geo_info(2).unwrap(),
            GeometryInfo::from_wkt_literal("POINT(1 1)")
        );
        assert!(vocab.get_geo_info(3).is_err());
    }

    #[test]
    fn test_invalid_polygon_areas_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let words = [
            "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))",
            "POLYGON((0 0, 1 1, 0 0))",
            "LINESTRING(0 0, 1 1)",
        ];
        let statistics = write_words(dir.path(), &words, GeoWriterConfig::default());
        assert_eq!(statistics.num_invalid_geometries, 0);
        assert_eq!(statistics.num_invalid_polygon_areas, 1);
    }

    #[test]
    fn test_version_mismatch_requires_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        write_words(dir.path(), &["POINT(3 4)"], GeoWriterConfig::default());
        let sidecar = geo_info_filename(&dir.path().join("geo"));
        let mut bytes = std::fs::read(&sidecar).unwrap();
        bytes[..8].copy_from_slice(&(GEOMETRY_INFO_VERSION + 1).to_le_bytes());
        std::fs::write(&sidecar, bytes).unwrap();

        let mut vocab = GeoVocabulary::new(VocabularyInMemory::new());
        let err = vocab.open(&dir.path().join("geo")).unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleFormat(_)));
        assert!(err.to_string().contains("Please rebuild your index"));
    }

    #[test]
    fn test_drop_without_finish_writes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("geo");
        {
            let vocab = GeoVocabulary::new(VocabularyInMemory::new());
            let mut writer = vocab
                .make_disk_writer(&filename, GeoWriterConfig::default())
                .unwrap();
            writer.append("POINT(5 6)", false).unwrap();
            writer.append("POINT(7 8)", true).unwrap();
        }
        let mut vocab = GeoVocabulary::new(VocabularyInMemory::new());
        vocab.open(&filename).unwrap();
        assert_eq!(
            vocab.get_geo_info(1).unwrap(),
            GeometryInfo::from_wkt_literal("POINT(7 8)")
        );
    }

    /// Hands out indices that skip one value after the first word.
    struct SkippingWriter {
        next: u64,
    }

    impl WordWriter for SkippingWriter {
        fn append(&mut self, _word: &str, _is_external: bool) -> Result<u64> {
            let index = self.next;
            self.next += if index == 0 { 2 } else { 1 };
            Ok(index)
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_index_mismatch_fails_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("geo");
        let mut writer =
            GeoWordWriter::new(SkippingWriter { next: 0 }, &filename, GeoWriterConfig::default()).unwrap();
        assert_eq!(writer.append("POINT(0 0)", false).unwrap(), 0);
        assert!(writer.append("POINT(1 1)", false).is_err());
        assert!(writer.append("POINT(2 2)", false).is_err());
        let err = writer.finish().unwrap_err();
        assert!(matches!(err, EngineError::PreconditionViolation(_)));
        assert!(writer.statistics().is_none());
    }
}
