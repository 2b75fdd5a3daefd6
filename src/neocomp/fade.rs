// Keyframe fades
//
// Every animated scalar (opacity, background opacity, dim) is driven
// by a small ring of keyframes. The ring never allocates; head is the
// keyframe currently advancing and tail the newest scheduled one.
pub const FADE_KEYFRAMES: usize = 10;

#[derive(Copy, Clone, Debug)]
pub struct Keyframe {
    pub target: f64,
    /// Time to fade from the previous keyframe's target
    pub duration: f64,
    /// How long we have been in the current fade
    pub time: f64,
    /// Swallow exactly one dt before advancing. Used when a keyframe is
    /// scheduled mid-frame, after this frame's dt was already measured.
    pub ignore: bool,
}

impl Keyframe {
    fn done(&self) -> bool {
        self.time >= self.duration
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Fade {
    keyframes: [Keyframe; FADE_KEYFRAMES],
    /// The currently advancing keyframe
    head: usize,
    /// The newest scheduled keyframe
    tail: usize,
    /// The current animated value
    pub value: f64,
}

fn next(index: usize) -> usize {
    (index + 1) % FADE_KEYFRAMES
}

fn prev(index: usize) -> usize {
    (index + FADE_KEYFRAMES - 1) % FADE_KEYFRAMES
}

impl Fade {
    pub fn new(value: f64) -> Fade {
        let mut fade = Fade {
            keyframes: [Keyframe {
                target: value,
                duration: 0.0,
                time: 0.0,
                ignore: false,
            }; FADE_KEYFRAMES],
            head: 0,
            tail: 0,
            value,
        };
        fade.keyframes[0].target = value;
        fade
    }

    /// Schedule a fade toward `target` over `duration` ms.
    ///
    /// Scheduling the target the tail already has is a no-op. A zero
    /// duration applies instantly.
    pub fn keyframe(&mut self, target: f64, duration: f64) {
        self.schedule(target, duration, false)
    }

    /// Like `keyframe`, but the new keyframe ignores the next dt. Used
    /// by systems that run after this frame's dt was measured.
    pub fn keyframe_delayed(&mut self, target: f64, duration: f64) {
        self.schedule(target, duration, true)
    }

    fn schedule(&mut self, target: f64, duration: f64, ignore: bool) {
        // Deduplicate against the newest scheduled keyframe
        if self.keyframes[self.tail].target == target {
            return;
        }

        if duration <= 0.0 {
            // Instant: collapse the whole ring onto the target
            self.keyframes[self.tail] = Keyframe {
                target,
                duration: 0.0,
                time: 0.0,
                ignore: false,
            };
            self.head = self.tail;
            self.value = target;
            return;
        }

        let slot = next(self.tail);
        if slot == self.head {
            // Ring full; the oldest un-reached keyframe is abandoned
            self.head = next(self.head);
        }
        self.keyframes[slot] = Keyframe {
            target,
            duration,
            time: 0.0,
            ignore,
        };
        self.tail = slot;
    }

    /// Advance by dt milliseconds. Returns whether the fade is still
    /// in flight afterwards.
    pub fn tick(&mut self, dt: f64) -> bool {
        if self.done() {
            return false;
        }

        // The head may be a completed keyframe left behind by an
        // earlier frame; move on to the next scheduled one
        while self.head != self.tail && self.keyframes[self.head].done() {
            self.head = next(self.head);
        }

        let base = self.keyframes[prev(self.head)].target;
        let kf = &mut self.keyframes[self.head];

        if kf.ignore {
            kf.ignore = false;
            return !self.done();
        }

        kf.time += dt;
        if kf.done() {
            self.value = kf.target;
        } else {
            let t = kf.time / kf.duration;
            self.value = base + (kf.target - base) * t;
        }

        !self.done()
    }

    /// A fade is done when the newest keyframe has been reached.
    pub fn done(&self) -> bool {
        self.head == self.tail && self.keyframes[self.head].done()
    }

    pub fn target(&self) -> f64 {
        self.keyframes[self.tail].target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_fade_is_done() {
        let fade = Fade::new(100.0);
        assert!(fade.done());
        assert_eq!(fade.value, 100.0);
    }

    #[test]
    fn progress_is_linear() {
        let mut fade = Fade::new(0.0);
        fade.keyframe(100.0, 200.0);

        let mut elapsed = 0.0;
        for _ in 0..10 {
            fade.tick(10.0);
            elapsed += 10.0;
            let expected = 100.0 * elapsed / 200.0;
            assert!((fade.value - expected).abs() < 1e-9, "at t={}", elapsed);
        }
    }

    #[test]
    fn completes_at_duration() {
        let mut fade = Fade::new(0.0);
        fade.keyframe(100.0, 50.0);

        fade.tick(25.0);
        assert!(!fade.done());
        fade.tick(25.0);
        assert_eq!(fade.value, 100.0);
        assert!(fade.done());
    }

    #[test]
    fn overshoot_clamps_to_target() {
        let mut fade = Fade::new(0.0);
        fade.keyframe(100.0, 50.0);

        fade.tick(500.0);
        assert_eq!(fade.value, 100.0);
        assert!(fade.done());
    }

    #[test]
    fn duplicate_target_is_deduplicated() {
        let mut fade = Fade::new(0.0);
        fade.keyframe(100.0, 50.0);
        let tail_before = fade.tail;
        fade.keyframe(100.0, 900.0);
        assert_eq!(fade.tail, tail_before);
    }

    #[test]
    fn zero_duration_applies_instantly() {
        let mut fade = Fade::new(0.0);
        fade.keyframe(60.0, 0.0);
        assert_eq!(fade.value, 60.0);
        assert!(fade.done());
    }

    #[test]
    fn queued_keyframes_play_in_order() {
        let mut fade = Fade::new(0.0);
        fade.keyframe(100.0, 100.0);
        fade.keyframe(50.0, 100.0);

        // Run the first fade to completion
        fade.tick(100.0);
        assert_eq!(fade.value, 100.0);
        assert!(!fade.done());

        // Halfway into the second fade: from 100 toward 50
        fade.tick(50.0);
        assert!((fade.value - 75.0).abs() < 1e-9);

        fade.tick(50.0);
        assert_eq!(fade.value, 50.0);
        assert!(fade.done());
    }

    #[test]
    fn delayed_keyframe_swallows_one_tick() {
        let mut fade = Fade::new(0.0);
        fade.keyframe_delayed(100.0, 100.0);

        fade.tick(10.0);
        assert_eq!(fade.value, 0.0);

        fade.tick(10.0);
        assert!((fade.value - 10.0).abs() < 1e-9);
    }
}
