//! Reference sounder: alarm playback over an abstract audio backend.
//!
//! The klaxon owns the playback policy the engine should not know
//! about: which track to play (configured ringtone, random pick from a
//! playlist, or the bundled default tone), at what volume (per-phase
//! setting, in-call cap, increasing-volume ramp), and the
//! save-and-restore of the backend volume around a ring.
//!
//! Start is not reentrant: starting while already playing first fully
//! stops, restoring the saved volume, then starts fresh.

use rand::seq::SliceRandom;
use tracing::warn;

use crate::alarm::template::VolumeSetting;
use crate::alarm::AlarmInstance;
use crate::error::SounderError;
use crate::ports::Sounder;
use crate::storage::EnginePolicy;

/// Track the klaxon falls back to when nothing else plays.
pub const DEFAULT_TONE: &str = "default_alarm_tone";

/// Volume the increasing-volume ramp starts from.
const RAMP_START_VOLUME: u8 = 10;
/// Volume added per ramp step.
const RAMP_STEP: u8 = 10;

/// Actual audio output. Implementations wrap the platform player.
pub trait AudioBackend {
    /// Begin looping playback of `track`.
    fn play(&mut self, track: &str) -> Result<(), SounderError>;
    /// Stop playback. No-op when idle.
    fn stop(&mut self);
    fn volume(&self) -> u8;
    fn set_volume(&mut self, volume: u8);
}

/// Stateful [`Sounder`] implementation over an [`AudioBackend`].
pub struct Klaxon<B: AudioBackend> {
    backend: B,
    /// Tracks to draw from when random playback applies.
    playlist: Vec<String>,
    in_call_volume: u8,
    saved_volume: Option<u8>,
    /// Ramp target while increasing volume is active.
    ramp_target: Option<u8>,
    playing: bool,
}

impl<B: AudioBackend> Klaxon<B> {
    pub fn new(backend: B, policy: &EnginePolicy) -> Self {
        Self {
            backend,
            playlist: Vec::new(),
            in_call_volume: policy.in_call_volume,
            saved_volume: None,
            ramp_target: None,
            playing: false,
        }
    }

    pub fn with_playlist(mut self, playlist: Vec<String>) -> Self {
        self.playlist = playlist;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// One step of the increasing-volume ramp. The caller ticks this
    /// alongside its wake-up loop; it is a no-op once the target is
    /// reached or when no ramp is active.
    pub fn advance_ramp(&mut self) {
        if !self.playing {
            return;
        }
        if let Some(target) = self.ramp_target {
            let current = self.backend.volume();
            if current < target {
                self.backend
                    .set_volume(current.saturating_add(RAMP_STEP).min(target));
            }
        }
    }

    fn pick_track(&self, instance: &AlarmInstance, pre_alarm: bool) -> String {
        if instance.random_playback.applies(pre_alarm) && !self.playlist.is_empty() {
            if let Some(track) = self.playlist.choose(&mut rand::thread_rng()) {
                return track.clone();
            }
        }
        instance
            .ringtone
            .clone()
            .unwrap_or_else(|| DEFAULT_TONE.to_string())
    }

    fn apply_volume(&mut self, instance: &AlarmInstance, pre_alarm: bool, in_call: bool) {
        self.saved_volume = Some(self.backend.volume());

        let mut target = match instance.volume_for(pre_alarm) {
            VolumeSetting::System => self.backend.volume(),
            VolumeSetting::Level(v) => v,
        };
        if in_call {
            target = target.min(self.in_call_volume);
        }

        if instance.increasing_volume.applies(pre_alarm) {
            self.ramp_target = Some(target);
            self.backend.set_volume(RAMP_START_VOLUME.min(target));
        } else {
            self.ramp_target = None;
            self.backend.set_volume(target);
        }
    }

    fn stop_internal(&mut self) {
        if !self.playing {
            return;
        }
        self.backend.stop();
        if let Some(saved) = self.saved_volume.take() {
            self.backend.set_volume(saved);
        }
        self.ramp_target = None;
        self.playing = false;
    }
}

impl<B: AudioBackend> Sounder for Klaxon<B> {
    fn start(
        &mut self,
        instance: &AlarmInstance,
        pre_alarm: bool,
        in_call: bool,
    ) -> Result<(), SounderError> {
        self.stop_internal();

        let track = self.pick_track(instance, pre_alarm);
        self.apply_volume(instance, pre_alarm, in_call);

        if let Err(err) = self.backend.play(&track) {
            warn!(track, %err, "ringtone failed, falling back to default tone");
            if let Err(fallback_err) = self.backend.play(DEFAULT_TONE) {
                warn!(%fallback_err, "default tone failed");
                // Restore the volume we saved; nothing is playing.
                if let Some(saved) = self.saved_volume.take() {
                    self.backend.set_volume(saved);
                }
                return Err(SounderError::NoTone {
                    fallback: DEFAULT_TONE.to_string(),
                });
            }
        }
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_internal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::template::ModeOption;
    use crate::alarm::InstanceState;
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct FakeBackend {
        playing: Option<String>,
        volume: u8,
        played: Vec<String>,
        reject: Vec<String>,
    }

    impl AudioBackend for FakeBackend {
        fn play(&mut self, track: &str) -> Result<(), SounderError> {
            self.played.push(track.to_string());
            if self.reject.iter().any(|t| t == track) {
                return Err(SounderError::Playback {
                    track: track.to_string(),
                    reason: "unsupported".into(),
                });
            }
            self.playing = Some(track.to_string());
            Ok(())
        }

        fn stop(&mut self) {
            self.playing = None;
        }

        fn volume(&self) -> u8 {
            self.volume
        }

        fn set_volume(&mut self, volume: u8) {
            self.volume = volume;
        }
    }

    fn instance() -> AlarmInstance {
        let t = Utc.with_ymd_and_hms(2026, 8, 28, 8, 0, 0).unwrap();
        AlarmInstance {
            id: 1,
            template_id: Some(1),
            alarm_time: t,
            original_alarm_time: t,
            state: InstanceState::Fired,
            pre_alarm_time: None,
            label: String::new(),
            ringtone: Some("chime".into()),
            vibrate: true,
            delete_after_use: false,
            alarm_volume: VolumeSetting::Level(80),
            pre_alarm_volume: VolumeSetting::Level(30),
            increasing_volume: ModeOption::Off,
            random_playback: ModeOption::Off,
        }
    }

    fn klaxon(backend: FakeBackend) -> Klaxon<FakeBackend> {
        Klaxon::new(backend, &EnginePolicy::default())
    }

    #[test]
    fn start_plays_ringtone_at_configured_volume() {
        let mut k = klaxon(FakeBackend {
            volume: 50,
            ..Default::default()
        });
        k.start(&instance(), false, false).unwrap();
        assert!(k.is_playing());
        assert_eq!(k.backend.playing.as_deref(), Some("chime"));
        assert_eq!(k.backend.volume, 80);
    }

    #[test]
    fn pre_alarm_uses_pre_alarm_volume() {
        let mut k = klaxon(FakeBackend::default());
        k.start(&instance(), true, false).unwrap();
        assert_eq!(k.backend.volume, 30);
    }

    #[test]
    fn stop_restores_saved_volume_and_is_idempotent() {
        let mut k = klaxon(FakeBackend {
            volume: 50,
            ..Default::default()
        });
        k.start(&instance(), false, false).unwrap();
        k.stop();
        assert!(!k.is_playing());
        assert_eq!(k.backend.volume, 50);
        assert!(k.backend.playing.is_none());

        // Second stop is a no-op.
        k.stop();
        assert_eq!(k.backend.volume, 50);
    }

    #[test]
    fn restart_stops_first() {
        let mut k = klaxon(FakeBackend {
            volume: 50,
            ..Default::default()
        });
        k.start(&instance(), true, false).unwrap();
        assert_eq!(k.backend.volume, 30);
        // Second start must restore 50 before saving again, so a later
        // stop lands back on the real system volume.
        k.start(&instance(), false, false).unwrap();
        assert_eq!(k.backend.volume, 80);
        k.stop();
        assert_eq!(k.backend.volume, 50);
    }

    #[test]
    fn falls_back_to_default_tone() {
        let mut k = klaxon(FakeBackend {
            reject: vec!["chime".into()],
            ..Default::default()
        });
        k.start(&instance(), false, false).unwrap();
        assert_eq!(k.backend.playing.as_deref(), Some(DEFAULT_TONE));
        assert!(k.is_playing());
    }

    #[test]
    fn double_failure_surfaces_error() {
        let mut k = klaxon(FakeBackend {
            volume: 50,
            reject: vec!["chime".into(), DEFAULT_TONE.into()],
            ..Default::default()
        });
        let err = k.start(&instance(), false, false).unwrap_err();
        assert!(matches!(err, SounderError::NoTone { .. }));
        assert!(!k.is_playing());
        assert_eq!(k.backend.volume, 50);
    }

    #[test]
    fn in_call_caps_volume() {
        let mut k = klaxon(FakeBackend::default());
        k.start(&instance(), false, true).unwrap();
        assert_eq!(k.backend.volume, EnginePolicy::default().in_call_volume);
    }

    #[test]
    fn increasing_volume_ramps_to_target() {
        let mut inst = instance();
        inst.increasing_volume = ModeOption::MainOnly;
        let mut k = klaxon(FakeBackend::default());
        k.start(&inst, false, false).unwrap();
        assert_eq!(k.backend.volume, RAMP_START_VOLUME);

        while k.backend.volume < 80 {
            let before = k.backend.volume;
            k.advance_ramp();
            assert!(k.backend.volume > before);
        }
        k.advance_ramp();
        assert_eq!(k.backend.volume, 80);
    }

    #[test]
    fn random_playback_draws_from_playlist() {
        let mut inst = instance();
        inst.random_playback = ModeOption::Both;
        let playlist = vec!["a".to_string(), "b".to_string()];
        let mut k = klaxon(FakeBackend::default()).with_playlist(playlist.clone());
        k.start(&inst, false, false).unwrap();
        let playing = k.backend.playing.clone().unwrap();
        assert!(playlist.contains(&playing));
    }
}
