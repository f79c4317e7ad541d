use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use pyrovis_render_graph::node::FrameRecorder;

/// 把每一帧的 B8G8R8A8 像素直接追加到文件中
///
/// 结束时在同目录写一个 `<file>.json`，记录尺寸、帧率和帧数，供外部工具编码。
/// 录制中帧尺寸发生变化时，当前文件结束，后续帧写入 `<stem>-<n>.<ext>`。
pub struct RawFrameRecorder {
    frame_rate: u32,
    bit_rate: u32,
    session: Option<RecordSession>,
    /// `begin` 传入的路径，以及因尺寸变化切换过的次数
    base_path: PathBuf,
    segment: u32,
}

struct RecordSession {
    path: PathBuf,
    writer: BufWriter<File>,
    width: u32,
    height: u32,
    frames: u64,
}

// new & init
impl RawFrameRecorder {
    pub fn new(frame_rate: u32, bit_rate: u32) -> Self {
        Self {
            frame_rate,
            bit_rate,
            session: None,
            base_path: PathBuf::new(),
            segment: 0,
        }
    }

    fn open_session(&mut self, path: &Path, width: u32, height: u32) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let writer = BufWriter::new(File::create(path)?);
        log::info!("start recording {width}x{height} to {}", path.display());
        self.session = Some(RecordSession {
            path: path.to_path_buf(),
            writer,
            width,
            height,
            frames: 0,
        });
        Ok(())
    }
}

// getters
impl RawFrameRecorder {
    pub fn frame_count(&self) -> u64 {
        self.session.as_ref().map_or(0, |session| session.frames)
    }

    pub fn metadata_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    /// 第 `segment` 段的文件名，第 0 段就是 `path` 本身
    pub fn segment_path(path: &Path, segment: u32) -> PathBuf {
        if segment == 0 {
            return path.to_path_buf();
        }
        let stem = path.file_stem().map(|stem| stem.to_string_lossy()).unwrap_or_default();
        let name = match path.extension() {
            Some(ext) => format!("{stem}-{segment}.{}", ext.to_string_lossy()),
            None => format!("{stem}-{segment}"),
        };
        path.with_file_name(name)
    }
}

impl FrameRecorder for RawFrameRecorder {
    fn begin(&mut self, path: &Path, width: u32, height: u32) -> std::io::Result<()> {
        if self.session.is_some() {
            self.end()?;
        }
        self.base_path = path.to_path_buf();
        self.segment = 0;
        self.open_session(path, width, height)
    }

    fn append(&mut self, frame: &[u8], width: u32, height: u32) -> std::io::Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Err(std::io::Error::other("recorder is not recording"));
        };

        if (session.width, session.height) != (width, height) {
            log::info!("frame size changed from {}x{} to {width}x{height}", session.width, session.height);
            self.end()?;
            self.segment += 1;
            let path = Self::segment_path(&self.base_path, self.segment);
            self.open_session(&path, width, height)?;
        }
        let Some(session) = self.session.as_mut() else {
            return Err(std::io::Error::other("recorder is not recording"));
        };

        let expected = session.width as usize * session.height as usize * 4;
        if frame.len() != expected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame has {} bytes, expected {expected}", frame.len()),
            ));
        }
        session.writer.write_all(frame)?;
        session.frames += 1;
        Ok(())
    }

    fn end(&mut self) -> std::io::Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session.writer.flush()?;

        let metadata = serde_json::json!({
            "format": "B8G8R8A8",
            "width": session.width,
            "height": session.height,
            "frames": session.frames,
            "frame_rate": self.frame_rate,
            "bit_rate": self.bit_rate,
        });
        let text = serde_json::to_string_pretty(&metadata).map_err(std::io::Error::other)?;
        std::fs::write(Self::metadata_path(&session.path), text)?;

        log::info!("stop recording, {} frames written to {}", session.frames, session.path.display());
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pyrovis-recorder-{}-{name}", std::process::id())).join("out.raw")
    }

    #[test]
    fn writes_frames_and_metadata() {
        let path = output("frames");
        let mut recorder = RawFrameRecorder::new(24, 1_000_000);
        recorder.begin(&path, 2, 2).unwrap();
        assert!(recorder.is_recording());

        recorder.append(&[1u8; 16], 2, 2).unwrap();
        recorder.append(&[2u8; 16], 2, 2).unwrap();
        assert_eq!(recorder.frame_count(), 2);
        assert!(recorder.append(&[0u8; 15], 2, 2).is_err());
        recorder.end().unwrap();
        assert!(!recorder.is_recording());

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[16..], &[2u8; 16]);

        let metadata: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(RawFrameRecorder::metadata_path(&path)).unwrap()).unwrap();
        assert_eq!(metadata["frames"], 2);
        assert_eq!(metadata["frame_rate"], 24);

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn append_without_begin_fails() {
        let mut recorder = RawFrameRecorder::new(30, 0);
        assert!(recorder.append(&[], 0, 0).is_err());
        recorder.end().unwrap();
    }

    #[test]
    fn size_change_starts_next_segment() {
        let path = output("segments");
        let mut recorder = RawFrameRecorder::new(30, 0);
        recorder.begin(&path, 2, 2).unwrap();
        recorder.append(&[1u8; 16], 2, 2).unwrap();
        recorder.append(&[2u8; 24], 3, 2).unwrap();
        recorder.append(&[3u8; 24], 3, 2).unwrap();
        assert!(recorder.is_recording());
        assert_eq!(recorder.frame_count(), 2);
        recorder.end().unwrap();

        let second = RawFrameRecorder::segment_path(&path, 1);
        assert_eq!(second.file_name().unwrap(), "out-1.raw");
        assert_eq!(std::fs::read(&path).unwrap().len(), 16);
        assert_eq!(std::fs::read(&second).unwrap().len(), 48);

        let read_metadata = |path: &Path| -> serde_json::Value {
            serde_json::from_str(&std::fs::read_to_string(RawFrameRecorder::metadata_path(path)).unwrap()).unwrap()
        };
        assert_eq!(read_metadata(&path)["width"], 2);
        assert_eq!(read_metadata(&path)["frames"], 1);
        assert_eq!(read_metadata(&second)["width"], 3);
        assert_eq!(read_metadata(&second)["frames"], 2);

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
