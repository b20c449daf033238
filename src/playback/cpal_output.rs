//! Real audio output using CPAL (Cross-Platform Audio Library).

use crate::error::{PcmcastError, Result};
use crate::playback::device::OutputDevice;
use crate::stream::chunk::AudioChunk;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL prints ALSA/JACK/PipeWire probing noise while enumerating backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// List output device names, marking the system default.
pub fn list_output_devices() -> Result<Vec<String>> {
    let (default_name, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let devices = host.output_devices().map(|iter| {
            iter.filter_map(|d| d.name().ok()).collect::<Vec<_>>()
        });
        (default_name, devices)
    });

    let devices = devices.map_err(|e| PcmcastError::AudioPlayback {
        message: format!("Failed to enumerate output devices: {}", e),
    })?;

    Ok(devices
        .into_iter()
        .map(|name| {
            if default_name.as_deref() == Some(name.as_str()) {
                format!("{} [default]", name)
            } else {
                name
            }
        })
        .collect())
}

fn find_output_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        let Some(name) = device_name else {
            return host
                .default_output_device()
                .ok_or_else(|| PcmcastError::AudioDeviceNotFound {
                    device: "default".to_string(),
                });
        };

        let devices = host
            .output_devices()
            .map_err(|e| PcmcastError::AudioPlayback {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

        for dev in devices {
            if let Ok(dev_name) = dev.name()
                && dev_name == name
            {
                return Ok(dev);
            }
        }

        Err(PcmcastError::AudioDeviceNotFound {
            device: name.to_string(),
        })
    })
}

/// A chunk waiting in (or playing from) the device queue.
struct QueuedChunk {
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl QueuedChunk {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// State shared between the session task and the real-time callback.
struct Timeline {
    frames_played: AtomicU64,
    queue: Mutex<VecDeque<QueuedChunk>>,
    device_rate: u32,
}

impl Timeline {
    fn new(device_rate: u32) -> Self {
        Self {
            frames_played: AtomicU64::new(0),
            queue: Mutex::new(VecDeque::new()),
            device_rate,
        }
    }

    /// Fill one interleaved buffer and advance the clock by its frame count.
    ///
    /// The clock only moves while the queue lock is held, so `enqueue` never
    /// clamps against a frame count the queue has already rendered past.
    fn render(&self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        let frames = out.len() / channels.max(1);

        let Ok(mut queue) = self.queue.lock() else {
            self.frames_played.fetch_add(frames as u64, Ordering::AcqRel);
            return;
        };

        let base = self.frames_played.load(Ordering::Acquire);
        let end = base + frames as u64;

        for chunk in queue.iter() {
            if chunk.start_frame >= end || chunk.end_frame() <= base {
                continue;
            }
            let from = chunk.start_frame.max(base);
            let to = chunk.end_frame().min(end);
            for pos in from..to {
                let sample = chunk.samples[(pos - chunk.start_frame) as usize];
                let frame = (pos - base) as usize * channels;
                for slot in &mut out[frame..frame + channels] {
                    *slot += sample;
                }
            }
        }
        queue.retain(|c| c.end_frame() > end);

        self.frames_played.store(end, Ordering::Release);
    }

    /// Queue samples to start at `requested` frames on the device clock.
    ///
    /// A start frame that has already been rendered is moved up to the
    /// current frame. Returns the frame the samples will actually start at.
    fn enqueue(&self, requested: u64, samples: Arc<[f32]>, sequence: u64) -> Result<u64> {
        let mut queue = self.queue.lock().map_err(|e| PcmcastError::AudioPlayback {
            message: format!("Failed to lock playback queue: {}", e),
        })?;

        let played = self.frames_played.load(Ordering::Acquire);
        let start_frame = requested.max(played);
        queue.push_back(QueuedChunk {
            start_frame,
            samples,
        });
        drop(queue);

        if requested < played {
            tracing::debug!(
                sequence,
                late_frames = played - requested,
                "starting late chunk immediately"
            );
        }
        Ok(start_frame)
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in CpalOutputDevice
/// and is never used from the audio callback.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Output device backed by a CPAL stream.
///
/// The device clock counts frames rendered by the callback, so `now()`
/// follows the hardware rather than wall time. Tries a mono stream at the
/// synthesis rate first, then falls back to the device's native config and
/// resamples each chunk in software.
pub struct CpalOutputDevice {
    timeline: Arc<Timeline>,
    _stream: Mutex<SendableStream>,
}

impl CpalOutputDevice {
    /// Open and start an output stream.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the default output device.
    /// * `sample_rate` - Rate of the samples that will be scheduled.
    pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        let device = find_output_device(device_name)?;

        let (stream, timeline) = match build_preferred_stream(&device, sample_rate) {
            Ok(built) => built,
            Err(e) => {
                tracing::debug!(error = %e, "preferred output config rejected, using native");
                build_native_stream(&device)?
            }
        };

        stream.play().map_err(|e| PcmcastError::AudioPlayback {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        Ok(Self {
            timeline,
            _stream: Mutex::new(SendableStream(stream)),
        })
    }

    /// Native rate of the opened stream.
    pub fn device_rate(&self) -> u32 {
        self.timeline.device_rate
    }
}

impl OutputDevice for CpalOutputDevice {
    fn now(&self) -> f64 {
        self.timeline.frames_played.load(Ordering::Acquire) as f64
            / self.timeline.device_rate as f64
    }

    fn schedule(&self, chunk: &AudioChunk, sample_rate: u32, start_secs: f64) -> Result<()> {
        let device_rate = self.timeline.device_rate;
        let samples: Arc<[f32]> = if sample_rate == device_rate {
            chunk.shared_samples()
        } else {
            resample(chunk.samples(), sample_rate, device_rate).into()
        };

        let requested = (start_secs * device_rate as f64).round().max(0.0) as u64;
        self.timeline
            .enqueue(requested, samples, chunk.sequence)
            .map(|_| ())
    }
}

fn stream_error(err: cpal::StreamError) {
    tracing::warn!("Audio stream error: {}", err);
}

/// Mono f32 stream at the synthesis rate. Zero conversion.
fn build_preferred_stream(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<(cpal::Stream, Arc<Timeline>)> {
    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let timeline = Arc::new(Timeline::new(sample_rate));
    let render = Arc::clone(&timeline);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render.render(data, 1),
            stream_error,
            None,
        )
        .map_err(|e| PcmcastError::AudioPlayback {
            message: format!("Failed to build mono output stream: {}", e),
        })?;
    Ok((stream, timeline))
}

/// Stream at the device's default config; every channel gets the mono signal.
fn build_native_stream(device: &cpal::Device) -> Result<(cpal::Stream, Arc<Timeline>)> {
    use cpal::SampleFormat;

    let default_config = device
        .default_output_config()
        .map_err(|e| PcmcastError::AudioPlayback {
            message: format!("Failed to query default output config: {}", e),
        })?;

    let native_rate = default_config.sample_rate();
    let channels = default_config.channels() as usize;
    let stream_config: cpal::StreamConfig = default_config.clone().into();

    tracing::info!(
        channels,
        rate = native_rate,
        format = ?default_config.sample_format(),
        "using native output format, converting in software"
    );

    let timeline = Arc::new(Timeline::new(native_rate));
    let render = Arc::clone(&timeline);

    let stream = match default_config.sample_format() {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render.render(data, channels),
            stream_error,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    render.render(&mut scratch, channels);
                    for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                        *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                },
                stream_error,
                None,
            )
        }
        fmt => {
            return Err(PcmcastError::AudioPlayback {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a device with --device.",
                    fmt
                ),
            });
        }
    }
    .map_err(|e| PcmcastError::AudioPlayback {
        message: format!("Failed to build native output stream: {}", e),
    })?;

    Ok((stream, timeline))
}

/// Simple linear interpolation resampling.
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}
