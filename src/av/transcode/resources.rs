use log::{debug, warn};
use std::ops::{Deref, DerefMut};

use crate::av::{Demuxer, Muxer, Releasable};
use crate::codec::{VideoDecoder, VideoEncoder};
use crate::error::Result;

/// Owns one acquired resource and guarantees it is released exactly once.
///
/// `stop` is only called if [`mark_started`](Lease::mark_started) was
/// called. Dropping an unreleased lease releases it and logs a stop failure.
pub struct Lease<R: Releasable + ?Sized> {
    name: &'static str,
    resource: Box<R>,
    started: bool,
    released: bool,
}

impl<R: Releasable + ?Sized> Lease<R> {
    pub fn new(name: &'static str, resource: Box<R>) -> Self {
        Self {
            name,
            resource,
            started: false,
            released: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Records a successful `start`; release will stop the resource first.
    pub fn mark_started(&mut self) {
        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stops the resource if it was started, then releases it. Later calls
    /// do nothing. The resource is released even when `stop` fails; the
    /// stop error is returned afterwards.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let stopped = if self.started {
            self.started = false;
            self.resource.stop()
        } else {
            Ok(())
        };
        self.resource.release();
        debug!("Released {}", self.name);
        stopped
    }
}

impl<R: Releasable + ?Sized> Deref for Lease<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: Releasable + ?Sized> DerefMut for Lease<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.resource
    }
}

impl<R: Releasable + ?Sized> Drop for Lease<R> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to stop {}: {}", self.name, e);
        }
    }
}

/// Every handle one transcode acquires.
///
/// Dropping the set releases whatever was acquired, so an early return at
/// any point of the acquisition sequence or the drive loop leaks nothing.
/// The muxer is stopped after both codecs, once no more samples can reach it.
#[derive(Default)]
pub struct TranscodeResources {
    pub video_demuxer: Option<Lease<dyn Demuxer>>,
    pub audio_demuxer: Option<Lease<dyn Demuxer>>,
    pub decoder: Option<Lease<dyn VideoDecoder>>,
    pub encoder: Option<Lease<dyn VideoEncoder>>,
    pub muxer: Option<Lease<dyn Muxer>>,
}

impl TranscodeResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every held resource. Stop failures are logged, never
    /// returned, so they cannot replace an error already propagating.
    pub fn release_all(&mut self) {
        release_slot(&mut self.decoder);
        release_slot(&mut self.encoder);
        release_slot(&mut self.muxer);
        release_slot(&mut self.video_demuxer);
        release_slot(&mut self.audio_demuxer);
    }
}

impl Drop for TranscodeResources {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn release_slot<R: Releasable + ?Sized>(slot: &mut Option<Lease<R>>) {
    if let Some(mut lease) = slot.take() {
        if let Err(e) = lease.release() {
            warn!("Failed to stop {}: {}", lease.name(), e);
        }
    }
}
