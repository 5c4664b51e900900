//! Buffered reads over a real file.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::PathBuf;

use cadence_audio::reader::{open_reader, BufferedReader, FileReader, Reader};

/// Temp file holding bytes 0..100, removed on drop.
struct Fixture {
    path: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "cadence-reader-{name}-{}.bin",
            std::process::id()
        ));
        std::fs::write(&path, (0..100u8).collect::<Vec<u8>>()).unwrap();
        Self { path }
    }

    fn buffered(&self) -> BufferedReader<FileReader> {
        BufferedReader::new(FileReader::open(&self.path).unwrap(), 10)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
fn test_sequential_small_reads() {
    let fixture = Fixture::new("sequential");
    let mut reader = fixture.buffered();

    let mut buf = [0u8; 2];
    for start in (0..20u8).step_by(2) {
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [start, start + 1]);
    }
    assert_eq!(reader.current_position(), 20);
}

#[test]
fn test_read_larger_than_window() {
    let fixture = Fixture::new("large");
    let mut reader = fixture.buffered();

    let mut buf = [0u8; 30];
    assert_eq!(reader.read(&mut buf).unwrap(), 30);
    assert_eq!(buf[0], 0);
    assert_eq!(buf[29], 29);

    let mut small = [0u8; 2];
    reader.read(&mut small).unwrap();
    assert_eq!(small, [30, 31]);
}

#[test]
fn test_seek_then_read() {
    let fixture = Fixture::new("seek");
    let mut reader = fixture.buffered();

    reader.seek_absolute(50).unwrap();
    let mut buf = [0u8; 4];
    reader.read(&mut buf).unwrap();
    assert_eq!(buf, [50, 51, 52, 53]);

    reader.seek_relative(-10).unwrap();
    reader.read(&mut buf).unwrap();
    assert_eq!(buf, [44, 45, 46, 47]);

    assert!(reader.seek_relative(-1_000).is_err());
}

#[test]
fn test_read_across_end() {
    let fixture = Fixture::new("end");
    let mut reader = fixture.buffered();

    reader.seek_absolute(96).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], &[96, 97, 98, 99]);
    assert!(reader.eof().unwrap());
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_open_reader_on_path_and_file_url() {
    let fixture = Fixture::new("open");

    let mut by_path = open_reader(&fixture.path.display().to_string()).unwrap();
    assert_eq!(by_path.content_length().unwrap(), 100);

    let url = url::Url::from_file_path(&fixture.path).unwrap();
    let mut by_url = open_reader(url.as_str()).unwrap();
    let mut buf = [0u8; 3];
    by_url.read(&mut buf).unwrap();
    assert_eq!(buf, [0, 1, 2]);
}
