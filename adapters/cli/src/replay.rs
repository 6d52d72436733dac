use std::{sync::Arc, time::Duration};

use patrol_view_core::{EpisodeBatch, Frame};
use patrol_view_system_frame_derivation::LiveFeed;

/// Plays a recorded batch back into a [`LiveFeed`] at a fixed frame rate.
///
/// A rate that is not positive, or too small to express as a frame interval,
/// publishes the whole batch at once.
#[derive(Debug)]
pub(crate) struct ReplayPlayer {
    frames: Vec<Arc<Frame>>,
    feed: LiveFeed,
    interval: Option<Duration>,
    elapsed: Duration,
    looping: bool,
}

impl ReplayPlayer {
    pub(crate) fn new(batch: &EpisodeBatch, frames_per_second: f32, looping: bool) -> Self {
        let frames = batch
            .episodes()
            .iter()
            .flat_map(|episode| episode.frames.iter().cloned())
            .collect();
        let interval = (frames_per_second.is_finite() && frames_per_second > 0.0)
            .then(|| Duration::try_from_secs_f32(1.0 / frames_per_second).ok())
            .flatten();

        let mut player = Self {
            frames,
            feed: LiveFeed::new(),
            interval,
            elapsed: Duration::ZERO,
            looping,
        };
        player.publish_next();
        player
    }

    pub(crate) fn feed(&self) -> &LiveFeed {
        &self.feed
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.feed.len() == self.frames.len()
    }

    /// Publishes every frame that became due during `delta`.
    pub(crate) fn advance(&mut self, delta: Duration) {
        let Some(interval) = self.interval else {
            return;
        };
        self.elapsed += delta;
        while self.elapsed >= interval {
            self.elapsed -= interval;
            if self.is_finished() {
                if !self.looping || self.frames.is_empty() {
                    self.elapsed = Duration::ZERO;
                    return;
                }
                self.feed.restart();
            }
            self.publish_next();
        }
    }

    fn publish_next(&mut self) {
        match self.interval {
            Some(_) => {
                if let Some(frame) = self.frames.get(self.feed.len()) {
                    self.feed.push(Frame::clone(frame));
                }
            }
            None => {
                for frame in &self.frames {
                    self.feed.push(Frame::clone(frame));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patrol_view_core::Episode;

    fn batch(count: u64) -> EpisodeBatch {
        let frames = (0..count)
            .map(|timestep| Frame {
                timestep,
                ..Frame::default()
            })
            .collect();
        EpisodeBatch::new(vec![Episode::new(frames)])
    }

    #[test]
    fn frames_are_published_at_the_configured_rate() {
        let mut player = ReplayPlayer::new(&batch(5), 10.0, false);
        assert_eq!(player.feed().len(), 1);

        player.advance(Duration::from_millis(50));
        assert_eq!(player.feed().len(), 1);

        player.advance(Duration::from_millis(260));
        assert_eq!(player.feed().len(), 4);
        assert_eq!(player.feed().frames()[3].timestep, 3);
    }

    #[test]
    fn playback_stops_at_the_end_without_looping() {
        let mut player = ReplayPlayer::new(&batch(3), 10.0, false);
        let feed_id = player.feed().id();

        player.advance(Duration::from_secs(5));

        assert!(player.is_finished());
        assert_eq!(player.feed().len(), 3);
        assert_eq!(player.feed().id(), feed_id);
    }

    #[test]
    fn looping_restarts_the_feed() {
        let mut player = ReplayPlayer::new(&batch(2), 10.0, true);
        let first_id = player.feed().id();

        player.advance(Duration::from_millis(210));

        assert_ne!(player.feed().id(), first_id);
        assert_eq!(player.feed().len(), 1);
        assert_eq!(player.feed().frames()[0].timestep, 0);
    }

    #[test]
    fn non_positive_rate_publishes_everything_at_once() {
        let mut player = ReplayPlayer::new(&batch(4), 0.0, true);
        assert!(player.is_finished());

        player.advance(Duration::from_secs(1));
        assert_eq!(player.feed().len(), 4);
    }

    #[test]
    fn vanishing_rate_publishes_everything_at_once() {
        let mut player = ReplayPlayer::new(&batch(3), 1e-39, false);
        assert!(player.is_finished());

        player.advance(Duration::from_secs(60));
        assert_eq!(player.feed().len(), 3);
    }
}
