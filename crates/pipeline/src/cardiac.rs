//! Beat detection and heart-rate estimation on the ECG window.

use std::collections::VecDeque;

use biosignal_types::{CardiacConfig, HeartRateUpdate};
use tracing::trace;
use uuid::Uuid;

/// Snapshot of the ECG window handed to the beat engine.
#[derive(Debug, Clone)]
pub struct BeatRequest {
    pub session_id: Uuid,
    pub sample_index: u64,
    pub ecg: Vec<f32>,
    pub sample_rate: f32,
}

/// Rounded rate statistics over one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpmStats {
    pub bpm: u32,
    pub high: u32,
    pub low: u32,
    pub avg: u32,
}

/// A plausible beat-to-beat interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatInterval {
    /// Window-relative index of the beat closing the interval
    pub end: usize,
    pub ms: f32,
}

/// Result of scanning one window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeatAnalysis {
    /// Window-relative indices of accepted beats
    pub peaks: Vec<usize>,
    /// `None` when fewer than two beats were found or no interval was plausible
    pub stats: Option<BpmStats>,
    /// Intervals whose rate fell inside the plausible range
    pub intervals: Vec<BeatInterval>,
}

/// Find beats with an adaptive threshold and a refractory period, then
/// derive rate statistics from the plausible beat-to-beat intervals.
pub fn detect_beats(signal: &[f32], sample_rate: f32, config: &CardiacConfig) -> BeatAnalysis {
    if signal.len() < 3 {
        return BeatAnalysis::default();
    }

    let max = signal.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let threshold = 0.5 * max;
    let refractory = (config.refractory_secs * sample_rate).floor() as usize;

    let mut peaks = Vec::new();
    let mut last_beat: Option<usize> = None;
    for i in 1..signal.len() - 1 {
        let s = signal[i];
        if s > threshold
            && s > signal[i - 1]
            && s >= signal[i + 1]
            && last_beat.map_or(true, |last| i - last >= refractory)
        {
            peaks.push(i);
            last_beat = Some(i);
        }
    }

    if peaks.len() < 2 {
        return BeatAnalysis { peaks, ..BeatAnalysis::default() };
    }

    let mut rates = Vec::with_capacity(peaks.len() - 1);
    let mut intervals = Vec::with_capacity(peaks.len() - 1);
    for pair in peaks.windows(2) {
        let gap_secs = (pair[1] - pair[0]) as f32 / sample_rate;
        let bpm = 60.0 / gap_secs;
        if (config.min_bpm..=config.max_bpm).contains(&bpm) {
            rates.push(bpm);
            intervals.push(BeatInterval { end: pair[1], ms: gap_secs * 1000.0 });
        }
    }

    if rates.is_empty() {
        return BeatAnalysis { peaks, ..BeatAnalysis::default() };
    }

    let mean = rates.iter().sum::<f32>() / rates.len() as f32;
    let high = rates.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let low = rates.iter().copied().fold(f32::INFINITY, f32::min);
    let avg = mean.round() as u32;

    BeatAnalysis {
        peaks,
        stats: Some(BpmStats {
            bpm: avg,
            high: high.round() as u32,
            low: low.round() as u32,
            avg,
        }),
        intervals,
    }
}

/// Averages recent BPM estimates and rate-limits the displayed value.
#[derive(Debug, Clone)]
pub struct BpmSmoother {
    history: VecDeque<f32>,
    capacity: usize,
    max_step: f32,
    displayed: Option<f32>,
}

impl BpmSmoother {
    pub fn new(capacity: usize, max_step: f32) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            max_step,
            displayed: None,
        }
    }

    /// Feed one cycle's estimate; `None` resets the smoother.
    pub fn update(&mut self, bpm: Option<u32>) -> Option<u32> {
        let Some(bpm) = bpm else {
            self.reset();
            return None;
        };

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(bpm as f32);
        let smoothed = self.history.iter().sum::<f32>() / self.history.len() as f32;

        let next = match self.displayed {
            None => smoothed,
            Some(current) => current + (smoothed - current).clamp(-self.max_step, self.max_step),
        };
        self.displayed = Some(next);
        Some(next.round() as u32)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.displayed = None;
    }
}

/// Beat detector plus the state carried between cycles.
pub struct BeatEngine {
    config: CardiacConfig,
    smoother: BpmSmoother,
    intervals_ms: VecDeque<f32>,
    /// Absolute sample index of the newest beat already in `intervals_ms`
    last_interval_end: Option<u64>,
}

impl BeatEngine {
    pub fn new(config: &CardiacConfig) -> Self {
        Self {
            config: config.clone(),
            smoother: BpmSmoother::new(config.smoothing_len, config.max_step_bpm),
            intervals_ms: VecDeque::with_capacity(config.interval_history_len),
            last_interval_end: None,
        }
    }

    pub fn process(&mut self, request: &BeatRequest) -> HeartRateUpdate {
        let analysis = detect_beats(&request.ecg, request.sample_rate, &self.config);
        let stats = analysis.stats;

        if stats.is_some() {
            // Consecutive windows overlap; only intervals ending on a beat
            // newer than the last recorded one are added.
            let window_start = (request.sample_index + 1).saturating_sub(request.ecg.len() as u64);
            for interval in &analysis.intervals {
                let end = window_start + interval.end as u64;
                if self.last_interval_end.is_some_and(|last| end <= last) {
                    continue;
                }
                if self.intervals_ms.len() == self.config.interval_history_len {
                    self.intervals_ms.pop_front();
                }
                self.intervals_ms.push_back(interval.ms);
                self.last_interval_end = Some(end);
            }
        } else {
            self.intervals_ms.clear();
        }
        let displayed_bpm = self.smoother.update(stats.map(|s| s.bpm));

        trace!(
            sample_index = request.sample_index,
            peaks = analysis.peaks.len(),
            bpm = ?stats.map(|s| s.bpm),
            "Beat update computed"
        );

        HeartRateUpdate {
            session_id: request.session_id,
            sample_index: request.sample_index,
            bpm: stats.map(|s| s.bpm),
            high: stats.map(|s| s.high),
            low: stats.map(|s| s.low),
            avg: stats.map(|s| s.avg),
            displayed_bpm,
            peaks: analysis.peaks,
            recent_intervals_ms: self.intervals_ms.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 500.0;

    fn impulse_train(len: usize, first: usize, spacing: usize) -> Vec<f32> {
        let mut signal = vec![0.0; len];
        let mut i = first;
        while i < len {
            signal[i] = 1.0;
            i += spacing;
        }
        signal
    }

    #[test]
    fn test_sixty_bpm_impulse_train() {
        let config = CardiacConfig::default();
        let window = 2500;
        let signal = impulse_train(window, 250, FS as usize);
        let analysis = detect_beats(&signal, FS, &config);

        assert_eq!(analysis.peaks, vec![250, 750, 1250, 1750, 2250]);
        assert_eq!(analysis.peaks.len(), window / FS as usize);
        assert_eq!(analysis.stats, Some(BpmStats { bpm: 60, high: 60, low: 60, avg: 60 }));
        let intervals: Vec<f32> = analysis.intervals.iter().map(|i| i.ms).collect();
        assert_eq!(intervals, vec![1000.0; 4]);
        assert_eq!(analysis.intervals[0].end, 750);
    }

    #[test]
    fn test_too_short_or_flat_gives_no_result() {
        let config = CardiacConfig::default();
        let short = detect_beats(&[0.0, 1.0], FS, &config);
        assert_eq!(short.stats, None);
        assert!(short.peaks.is_empty());

        let flat = detect_beats(&vec![0.0; 2500], FS, &config);
        assert_eq!(flat.stats, None);
        assert!(flat.peaks.is_empty());
    }

    #[test]
    fn test_refractory_collapses_close_impulses() {
        let config = CardiacConfig::default();
        let mut signal = vec![0.0; 1000];
        signal[300] = 1.0;
        signal[350] = 0.9; // 100 ms later
        let analysis = detect_beats(&signal, FS, &config);
        assert_eq!(analysis.peaks, vec![300]);
        assert_eq!(analysis.stats, None);
    }

    #[test]
    fn test_implausible_rates_are_discarded() {
        let config = CardiacConfig::default();
        // 0.25 s spacing = 240 BPM, above the plausible range.
        let signal = impulse_train(2500, 10, 125);
        let analysis = detect_beats(&signal, FS, &config);
        assert!(analysis.peaks.len() > 2);
        assert_eq!(analysis.stats, None);
        assert!(analysis.intervals.is_empty());
    }

    #[test]
    fn test_mixed_intervals_statistics() {
        let config = CardiacConfig::default();
        let mut signal = vec![0.0; 2500];
        // Gaps: 500 (60 BPM), 400 (75 BPM), 300 (100 BPM)
        for i in [100, 600, 1000, 1300] {
            signal[i] = 1.0;
        }
        let analysis = detect_beats(&signal, FS, &config);
        let stats = analysis.stats.unwrap();
        assert_eq!(stats.high, 100);
        assert_eq!(stats.low, 60);
        assert_eq!(stats.avg, 78); // (60 + 75 + 100) / 3 = 78.33
        assert_eq!(stats.bpm, stats.avg);
    }

    #[test]
    fn test_plateau_counts_once() {
        let config = CardiacConfig::default();
        let mut signal = vec![0.0; 1500];
        signal[200] = 1.0;
        signal[201] = 1.0;
        signal[800] = 1.0;
        let analysis = detect_beats(&signal, FS, &config);
        assert_eq!(analysis.peaks, vec![200, 800]);
    }

    #[test]
    fn test_smoother_limits_step_and_resets() {
        let mut smoother = BpmSmoother::new(5, 2.0);
        assert_eq!(smoother.update(Some(60)), Some(60));
        // History mean is 70; the display moves at most 2 BPM.
        assert_eq!(smoother.update(Some(80)), Some(62));
        assert_eq!(smoother.update(Some(80)), Some(64));
        assert_eq!(smoother.update(None), None);
        assert_eq!(smoother.update(Some(90)), Some(90));
    }

    #[test]
    fn test_smoother_history_is_bounded() {
        let mut smoother = BpmSmoother::new(2, 100.0);
        smoother.update(Some(60));
        smoother.update(Some(60));
        // Only the last two values are averaged: (60 + 100) / 2
        assert_eq!(smoother.update(Some(100)), Some(80));
    }

    #[test]
    fn test_engine_tracks_intervals_and_resets_on_no_result() {
        let config = CardiacConfig::default();
        let mut engine = BeatEngine::new(&config);
        let session_id = Uuid::new_v4();
        let beating = BeatRequest {
            session_id,
            sample_index: 2499,
            ecg: impulse_train(2500, 250, 500),
            sample_rate: FS,
        };
        let update = engine.process(&beating);
        assert_eq!(update.bpm, Some(60));
        assert_eq!(update.displayed_bpm, Some(60));
        assert_eq!(update.recent_intervals_ms, vec![1000.0; 4]);

        // The same window again adds no intervals.
        let update = engine.process(&beating);
        assert_eq!(update.recent_intervals_ms, vec![1000.0; 4]);

        let flat = BeatRequest { ecg: vec![0.0; 2500], ..beating };
        let update = engine.process(&flat);
        assert_eq!(update.bpm, None);
        assert_eq!(update.displayed_bpm, None);
        assert!(update.peaks.is_empty());
        assert!(update.recent_intervals_ms.is_empty());
        assert_eq!(update.session_id, session_id);
    }

    #[test]
    fn test_overlapping_windows_add_only_new_intervals() {
        let config = CardiacConfig::default();
        let mut engine = BeatEngine::new(&config);
        let session_id = Uuid::new_v4();

        // Absolute beats every 500 samples from 250. Each window covers the
        // last 2500 samples and advances by one beat.
        let first = BeatRequest {
            session_id,
            sample_index: 2499,
            ecg: impulse_train(2500, 250, 500),
            sample_rate: FS,
        };
        assert_eq!(engine.process(&first).recent_intervals_ms.len(), 4);

        let mut second = first.clone();
        second.sample_index = 2999;
        let update = engine.process(&second);
        assert_eq!(update.recent_intervals_ms.len(), 5);

        let mut third = first.clone();
        third.sample_index = 3499;
        let update = engine.process(&third);
        assert_eq!(update.recent_intervals_ms, vec![1000.0; config.interval_history_len]);
        assert_eq!(update.bpm, Some(60));
    }
}
