use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;
use tar::{Archive, Builder, Header};

/// Writes the download artifact: a gzip-compressed tar archive with one
/// entry per processed strategy file.
pub struct ArchiveWriter {
    builder: Builder<GzEncoder<File>>,
    entries: usize,
}

impl ArchiveWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create archive {}", path.display()))?;
        let encoder = GzEncoder::new(file, Compression::default());
        Ok(Self {
            builder: Builder::new(encoder),
            entries: 0,
        })
    }

    pub fn add_entry(&mut self, name: &str, content: &str) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(chrono::Utc::now().timestamp() as u64);
        header.set_cksum();
        self.builder
            .append_data(&mut header, name, content.as_bytes())
            .with_context(|| format!("Failed to add archive entry {}", name))?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn finish(self) -> Result<()> {
        let encoder = self
            .builder
            .into_inner()
            .context("Failed to finalize archive")?;
        encoder.finish().context("Failed to flush archive")?;
        Ok(())
    }
}

/// Write `entries` to a fresh archive at `path`, returning how many landed.
///
/// With no entries the archive file is never created, so an all-skipped
/// batch leaves nothing behind.
pub fn write_archive(path: &Path, entries: &[(String, String)]) -> Result<usize> {
    if entries.is_empty() {
        return Ok(0);
    }
    let mut writer = ArchiveWriter::create(path)?;
    for (name, content) in entries {
        writer.add_entry(name, content)?;
    }
    let written = writer.entries();
    writer.finish()?;
    Ok(written)
}

/// List entry names of an archive produced by [`ArchiveWriter`].
pub fn list_entries(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open archive {}", path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut names = Vec::new();
    for entry in archive.entries().context("Failed to read archive")? {
        let entry = entry.context("Failed to read archive entry")?;
        let name = entry
            .path()
            .context("Archive entry has an invalid path")?
            .to_string_lossy()
            .into_owned();
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_write_and_list_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strategies.tar.gz");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer
            .add_entry("A_escalado_gerard.mq5", "content a")
            .unwrap();
        writer
            .add_entry("B_escalado_gerard.mq5", "content b")
            .unwrap();
        assert_eq!(writer.entries(), 2);
        writer.finish().unwrap();

        let names = list_entries(&path).unwrap();
        assert_eq!(
            names,
            vec!["A_escalado_gerard.mq5", "B_escalado_gerard.mq5"]
        );
    }

    #[test]
    fn test_write_archive_skips_file_creation_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tar.gz");

        let written = write_archive(&path, &[]).unwrap();
        assert_eq!(written, 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_write_archive_creates_file_with_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.tar.gz");

        let entries = vec![(
            "C_escalado_gerard.mq5".to_string(),
            "// patched".to_string(),
        )];
        let written = write_archive(&path, &entries).unwrap();
        assert_eq!(written, 1);
        assert_eq!(list_entries(&path).unwrap(), vec!["C_escalado_gerard.mq5"]);
    }

    #[test]
    fn test_entry_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.tar.gz");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.add_entry("S_escalado_benjamin.mq5", "void OnTick() {}\n").unwrap();
        writer.finish().unwrap();

        let file = File::open(&path).unwrap();
        let mut archive = Archive::new(GzDecoder::new(file));
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "void OnTick() {}\n");
    }
}
