use crate::acquire::payload::{ImagePayload, PayloadError};
use crate::alert;
use crate::common::settings::CameraSettings;
use async_trait::async_trait;
use derive_more::Constructor;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const CAPTURE_FILE_NAME: &str = "camera-capture.jpg";
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("Unable to access camera, check permissions: {0}")]
    PermissionDenied(String),
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Camera stream ended before a frame was captured")]
    StreamEnded,
    #[error("Camera IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot encode captured frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Captured frame rejected: {0}")]
    Payload(#[from] PayloadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    #[must_use]
    pub const fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Something that can open a live camera stream.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    async fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// An open, live camera stream.
///
/// Implementations must make both `stop` and `release_now` idempotent.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<RgbImage, CameraError>;

    /// Stop the device and wait until it is released.
    async fn stop(&mut self) -> Result<(), CameraError>;

    /// Best-effort synchronous release, used when a session is dropped.
    fn release_now(&mut self);
}

/// Owns an open camera stream until a frame is captured or the user cancels.
///
/// The stream is released on every exit: `capture`, `cancel`, and drop.
pub struct CameraSession {
    stream: Box<dyn FrameSource>,
    jpeg_quality: u8,
}

impl CameraSession {
    pub async fn open(backend: &dyn CameraBackend, jpeg_quality: u8) -> Result<Self, CameraError> {
        let stream = backend.open().await?;
        info!("Camera started");
        Ok(Self {
            stream,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        })
    }

    /// Grab one frame, stop the camera, and encode the frame as JPEG.
    pub async fn capture(mut self) -> Result<ImagePayload, CameraError> {
        let frame = self.stream.next_frame().await;
        if let Err(e) = self.stream.stop().await {
            alert!("Camera did not stop cleanly after capture: {e}");
        }
        let frame = frame?;
        let payload = encode_jpeg(&frame, self.jpeg_quality)?;
        info!(
            "Photo captured: {}x{}, {} bytes",
            frame.width(),
            frame.height(),
            payload.len()
        );
        Ok(payload)
    }

    pub async fn cancel(mut self) -> Result<(), CameraError> {
        debug!("Camera capture cancelled");
        self.stream.stop().await
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stream.release_now();
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<ImagePayload, CameraError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(frame)?;
    Ok(ImagePayload::new(bytes, mime::IMAGE_JPEG, CAPTURE_FILE_NAME)?)
}

/// Camera backed by an `ffmpeg` child process streaming raw rgb24 frames.
///
/// A reader task keeps only the newest frame, so a capture always gets what the
/// camera sees at that moment and ffmpeg never stalls on a full pipe.
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    settings: CameraSettings,
}

impl FfmpegCamera {
    #[must_use]
    pub const fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }

    fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.settings.width, self.settings.height)
    }

    fn args(&self) -> Vec<String> {
        let size = format!("{}x{}", self.settings.width, self.settings.height);
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.settings.input_format.clone(),
            "-video_size".to_string(),
            size.clone(),
            "-i".to_string(),
            self.settings.device.clone(),
            // The driver may pick another mode; the output size must match what we read.
            "-s".to_string(),
            size,
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl CameraBackend for FfmpegCamera {
    async fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        debug!(
            "Opening camera {} with {}",
            self.settings.device, self.settings.ffmpeg
        );
        let mut child = Command::new(&self.settings.ffmpeg)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CameraError::DeviceUnavailable(format!(
                    "{} not found",
                    self.settings.ffmpeg
                )),
                ErrorKind::PermissionDenied => CameraError::PermissionDenied(e.to_string()),
                _ => CameraError::Io(e),
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(CameraError::DeviceUnavailable(
                "ffmpeg pipes are not available".to_string(),
            ));
        };

        let (sender, frames) = watch::channel(None);
        let mut stream = FfmpegStream {
            child,
            frames,
            reader: tokio::spawn(read_frames(stdout, self.frame_size(), sender)),
            stderr: Some(tokio::spawn(drain_stderr(stderr))),
            stopped: false,
        };
        // The device only reports access problems once frames are requested.
        stream.next_frame().await?;
        Ok(Box::new(stream))
    }
}

async fn read_frames(
    stdout: ChildStdout,
    size: FrameSize,
    frames: watch::Sender<Option<RgbImage>>,
) {
    let mut stdout = BufReader::new(stdout);
    loop {
        let mut buf = vec![0u8; size.rgb_len()];
        if let Err(e) = stdout.read_exact(&mut buf).await {
            if e.kind() != ErrorKind::UnexpectedEof {
                warn!("Camera stream read failed: {e}");
            }
            return;
        }
        let Some(frame) = RgbImage::from_raw(size.width, size.height, buf) else {
            return;
        };
        if frames.send(Some(frame)).is_err() {
            return;
        }
    }
}

/// Keep ffmpeg's stderr flowing, holding on to the last lines for error reports.
async fn drain_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("ffmpeg: {line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

struct FfmpegStream {
    child: Child,
    frames: watch::Receiver<Option<RgbImage>>,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<String>>,
    stopped: bool,
}

impl FfmpegStream {
    async fn failure(&mut self) -> CameraError {
        self.stopped = true;
        self.reader.abort();
        self.child.start_kill().ok();
        self.child.wait().await.ok();
        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        classify_ffmpeg_failure(&stderr)
    }

    fn abort_tasks(&mut self) {
        self.reader.abort();
        if let Some(task) = self.stderr.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegStream {
    /// Wait for a frame newer than the last one handed out.
    async fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        if self.stopped {
            return Err(CameraError::StreamEnded);
        }
        if self.frames.changed().await.is_err() {
            return Err(self.failure().await);
        }
        self.frames
            .borrow_and_update()
            .clone()
            .ok_or(CameraError::StreamEnded)
    }

    async fn stop(&mut self) -> Result<(), CameraError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.abort_tasks();
        match self.child.start_kill() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        self.child.wait().await?;
        debug!("Camera stopped");
        Ok(())
    }

    fn release_now(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.abort_tasks();
            self.child.start_kill().ok();
        }
    }
}

/// Map ffmpeg's complaint about a capture device onto a camera error.
#[must_use]
pub fn classify_ffmpeg_failure(stderr: &str) -> CameraError {
    let message = stderr.trim();
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        CameraError::PermissionDenied(message.to_string())
    } else if message.is_empty() {
        CameraError::StreamEnded
    } else {
        CameraError::DeviceUnavailable(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        stops: AtomicUsize,
        releases: AtomicUsize,
    }

    struct FakeStream {
        frame: Option<RgbImage>,
        counters: Arc<Counters>,
        stopped: bool,
    }

    #[async_trait]
    impl FrameSource for FakeStream {
        async fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
            self.frame.clone().ok_or(CameraError::StreamEnded)
        }

        async fn stop(&mut self) -> Result<(), CameraError> {
            if !self.stopped {
                self.stopped = true;
                self.counters.stops.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn release_now(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.counters.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeCamera {
        frame: Option<RgbImage>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl CameraBackend for FakeCamera {
        async fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
            Ok(Box::new(FakeStream {
                frame: self.frame.clone(),
                counters: self.counters.clone(),
                stopped: false,
            }))
        }
    }

    fn camera(frame: Option<RgbImage>) -> (FakeCamera, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let camera = FakeCamera {
            frame,
            counters: counters.clone(),
        };
        (camera, counters)
    }

    #[tokio::test]
    async fn test_capture_encodes_jpeg_and_stops_camera() -> color_eyre::Result<()> {
        let (cam, counters) = camera(Some(RgbImage::from_pixel(8, 6, Rgb([200, 120, 40]))));

        let session = CameraSession::open(&cam, 80).await?;
        let payload = session.capture().await?;

        assert_eq!(payload.mime(), &mime::IMAGE_JPEG);
        assert_eq!(payload.file_name(), CAPTURE_FILE_NAME);
        assert_eq!(&payload.bytes()[..2], &[0xFF, 0xD8]);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_capture_still_stops_camera() -> color_eyre::Result<()> {
        let (cam, counters) = camera(None);

        let session = CameraSession::open(&cam, 80).await?;
        let err = session.capture().await.unwrap_err();

        assert!(matches!(err, CameraError::StreamEnded));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_stops_camera() -> color_eyre::Result<()> {
        let (cam, counters) = camera(Some(RgbImage::new(2, 2)));

        CameraSession::open(&cam, 80).await?.cancel().await?;

        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_dropping_session_releases_camera() -> color_eyre::Result<()> {
        let (cam, counters) = camera(Some(RgbImage::new(2, 2)));

        let session = CameraSession::open(&cam, 80).await?;
        drop(session);

        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_classify_permission_errors() {
        let err = classify_ffmpeg_failure(
            "[video4linux2,v4l2 @ 0x5] Cannot open video device /dev/video0: Permission denied\n",
        );
        assert!(matches!(err, CameraError::PermissionDenied(_)));

        let err = classify_ffmpeg_failure("/dev/video9: No such file or directory");
        assert!(matches!(err, CameraError::DeviceUnavailable(_)));

        assert!(matches!(classify_ffmpeg_failure("  "), CameraError::StreamEnded));
    }

    #[test]
    fn test_ffmpeg_args_use_settings() {
        let cam = FfmpegCamera::new(CameraSettings {
            device: "/dev/video2".to_string(),
            width: 320,
            height: 240,
            ..CameraSettings::default()
        });
        let args = cam.args();
        assert!(args.windows(2).any(|w| w == ["-i", "/dev/video2"]));
        assert!(args.windows(2).any(|w| w == ["-video_size", "320x240"]));
        let output_size = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[output_size + 1], "320x240");
        assert!(output_size > args.iter().position(|a| a == "-i").unwrap());
        assert_eq!(cam.frame_size().rgb_len(), 320 * 240 * 3);
    }

    #[cfg(target_os = "linux")]
    mod ffmpeg_process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;
        use tempfile::TempDir;

        /// 2x2 rgb24 frames at roughly 20 fps; every byte of frame `i` is `i * 10`.
        const LIVE_FEED: &str = r#"i=1
while :; do
  v=$((i * 10))
  if [ "$v" -gt 250 ]; then v=250; fi
  b="\\$(printf '%03o' "$v")"
  printf "$b$b$b$b$b$b$b$b$b$b$b$b" || exit 0
  i=$((i + 1))
  sleep 0.05
done
"#;

        const DENIED: &str = r#"echo "[video4linux2,v4l2 @ 0x1] Cannot open video device /dev/video0: Permission denied" >&2
exit 1
"#;

        /// Install a stand-in ffmpeg that records its pid next to itself.
        fn fake_ffmpeg(dir: &TempDir, body: &str) -> FfmpegCamera {
            let path = dir.path().join("ffmpeg");
            let pid_file = dir.path().join("pid");
            let script = format!("#!/bin/sh\necho $$ > '{}'\n{body}", pid_file.display());
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            FfmpegCamera::new(CameraSettings {
                ffmpeg: path.display().to_string(),
                width: 2,
                height: 2,
                ..CameraSettings::default()
            })
        }

        fn recorded_pid(dir: &TempDir) -> u32 {
            std::fs::read_to_string(dir.path().join("pid"))
                .unwrap()
                .trim()
                .parse()
                .unwrap()
        }

        /// Gone from /proc, or a zombie waiting to be reaped.
        async fn assert_exited(pid: u32) {
            for _ in 0..100 {
                match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                    Err(_) => return,
                    Ok(stat)
                        if stat
                            .rsplit(')')
                            .next()
                            .is_some_and(|state| state.trim_start().starts_with('Z')) =>
                    {
                        return;
                    }
                    Ok(_) => tokio::time::sleep(Duration::from_millis(50)).await,
                }
            }
            panic!("ffmpeg process {pid} is still running");
        }

        #[tokio::test]
        async fn test_capture_takes_current_frame_and_ends_process() -> color_eyre::Result<()> {
            let dir = tempfile::tempdir()?;
            let cam = fake_ffmpeg(&dir, LIVE_FEED);

            let session = CameraSession::open(&cam, 95).await?;
            tokio::time::sleep(Duration::from_millis(600)).await;
            let payload = session.capture().await?;

            let frame = image::load_from_memory(payload.bytes())?.to_rgb8();
            let value = frame.get_pixel(0, 0)[0];
            assert!(value >= 30, "captured a stale frame with value {value}");
            assert_exited(recorded_pid(&dir)).await;
            Ok(())
        }

        #[tokio::test]
        async fn test_cancel_ends_process() -> color_eyre::Result<()> {
            let dir = tempfile::tempdir()?;
            let cam = fake_ffmpeg(&dir, LIVE_FEED);

            CameraSession::open(&cam, 80).await?.cancel().await?;

            assert_exited(recorded_pid(&dir)).await;
            Ok(())
        }

        #[tokio::test]
        async fn test_drop_ends_process() -> color_eyre::Result<()> {
            let dir = tempfile::tempdir()?;
            let cam = fake_ffmpeg(&dir, LIVE_FEED);

            let session = CameraSession::open(&cam, 80).await?;
            drop(session);

            assert_exited(recorded_pid(&dir)).await;
            Ok(())
        }

        #[tokio::test]
        async fn test_permission_denied_on_open() -> color_eyre::Result<()> {
            let dir = tempfile::tempdir()?;
            let cam = fake_ffmpeg(&dir, DENIED);

            let Err(err) = CameraSession::open(&cam, 80).await else {
                panic!("camera opened despite the device refusing access");
            };

            assert!(matches!(err, CameraError::PermissionDenied(ref m) if m.contains("Permission denied")));
            assert_exited(recorded_pid(&dir)).await;
            Ok(())
        }

        #[tokio::test]
        async fn test_missing_executable_is_device_unavailable() {
            let cam = FfmpegCamera::new(CameraSettings {
                ffmpeg: "/nonexistent/ffmpeg".to_string(),
                ..CameraSettings::default()
            });

            let Err(err) = CameraSession::open(&cam, 80).await else {
                panic!("camera opened without an ffmpeg binary");
            };

            assert!(matches!(err, CameraError::DeviceUnavailable(_)));
        }
    }
}
