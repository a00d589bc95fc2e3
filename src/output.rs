use anyhow::{Context, Result};
use log::{error, info};
use simulation_common::{ConservedRecord, OutputConfig, Snapshot, CONSERVED_HEADER};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header of every per-snapshot CSV file.
pub const SNAPSHOT_HEADER: [&str; 7] = ["x", "y", "z", "vx", "vy", "vz", "m"];

/// Receives everything the driver emits during a run.
pub trait OutputSink {
    fn record_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;
    fn record_conserved(&mut self, record: &ConservedRecord) -> Result<()>;
    /// Called once after the last step.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps snapshots and conserved rows in memory.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    pub snapshots: Vec<Snapshot>,
    pub records: Vec<ConservedRecord>,
}

impl OutputSink for MemoryOutput {
    fn record_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn record_conserved(&mut self, record: &ConservedRecord) -> Result<()> {
        self.records.push(*record);
        Ok(())
    }
}

/// Aggregated snapshot archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Json,
    Bincode,
    MessagePack,
}

impl ArchiveFormat {
    /// Unknown names fall back to JSON.
    pub fn parse(name: &str) -> Self {
        match name {
            "json" => ArchiveFormat::Json,
            "bincode" => ArchiveFormat::Bincode,
            "messagepack" => ArchiveFormat::MessagePack,
            other => {
                error!("Unknown output format: {}. Using JSON instead.", other);
                ArchiveFormat::Json
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Bincode => "bin",
            ArchiveFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes snapshot CSVs, the conserved-quantity log and an optional snapshot archive.
pub struct FileOutput {
    directory: PathBuf,
    prefix: String,
    save_snapshots_csv: bool,
    conserved_writer: Option<csv::Writer<BufWriter<File>>>,
    archive: Option<ArchiveFormat>,
    archived: Vec<Snapshot>,
}

impl FileOutput {
    /// Creates the output directory if needed and opens the conserved-quantity log.
    pub fn create(config: &OutputConfig) -> Result<Self> {
        let directory = PathBuf::from(&config.output_directory);
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create output directory '{}'", directory.display()))?;

        let mut output = Self {
            directory,
            prefix: config.filename_prefix.clone(),
            save_snapshots_csv: config.save_snapshots_csv,
            conserved_writer: None,
            archive: config.format.as_deref().map(ArchiveFormat::parse),
            archived: Vec::new(),
        };

        if config.save_conserved {
            let path = output.conserved_path();
            let file = File::create(&path)
                .with_context(|| format!("Failed to create conserved log '{}'", path.display()))?;
            let mut writer = csv::Writer::from_writer(BufWriter::new(file));
            writer.write_record(CONSERVED_HEADER)?;
            info!("Writing conserved quantities to {}", path.display());
            output.conserved_writer = Some(writer);
        }
        Ok(output)
    }

    pub fn snapshot_path(&self, index: u32) -> PathBuf {
        self.directory.join(format!("{}_{:05}.csv", self.prefix, index))
    }

    pub fn conserved_path(&self) -> PathBuf {
        self.directory.join(format!("{}.csv", self.prefix))
    }

    pub fn archive_path(&self) -> Option<PathBuf> {
        self.archive
            .map(|format| self.directory.join(format!("{}_snapshots.{}", self.prefix, format.extension())))
    }

    fn write_archive(&self, format: ArchiveFormat, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        match format {
            ArchiveFormat::Json => serde_json::to_writer(&mut writer, &self.archived)
                .context("Error serializing snapshots to JSON")?,
            ArchiveFormat::Bincode => bincode::serialize_into(&mut writer, &self.archived)
                .context("Error serializing snapshots to bincode")?,
            ArchiveFormat::MessagePack => rmp_serde::encode::write(&mut writer, &self.archived)
                .context("Error serializing snapshots to MessagePack")?,
        }
        writer.flush()?;
        Ok(())
    }
}

/// Writes one snapshot as CSV rows `x,y,z,vx,vy,vz,m`.
pub fn write_snapshot_csv<W: Write>(writer: W, snapshot: &Snapshot) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(SNAPSHOT_HEADER)?;
    for ((x, v), m) in snapshot.positions.iter().zip(&snapshot.velocities).zip(&snapshot.masses) {
        writer.write_record(
            [x.x, x.y, x.z, v.x, v.y, v.z, *m].iter().map(|value| format!("{:.8e}", value)),
        )?;
    }
    writer.flush()?;
    Ok(())
}

impl OutputSink for FileOutput {
    fn record_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        if self.save_snapshots_csv {
            let path = self.snapshot_path(snapshot.index);
            info!("Writing output to {}", path.display());
            let file = File::create(&path).with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
            write_snapshot_csv(BufWriter::new(file), snapshot)?;
        }
        if self.archive.is_some() {
            self.archived.push(snapshot.clone());
        }
        Ok(())
    }

    fn record_conserved(&mut self, record: &ConservedRecord) -> Result<()> {
        if let Some(writer) = self.conserved_writer.as_mut() {
            writer.write_record(record.values().iter().map(|value| format!("{:.8e}", value)))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.conserved_writer.as_mut() {
            writer.flush()?;
        }
        if let (Some(format), Some(path)) = (self.archive, self.archive_path()) {
            self.write_archive(format, &path)?;
            info!("All {} snapshots saved to {} ({:?} format)", self.archived.len(), path.display(), format);
        }
        Ok(())
    }
}
