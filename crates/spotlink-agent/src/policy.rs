//! [`NavigationPolicy`] – turns a vision verdict into the next move.
//!
//! The model is asked to open its answer with one keyword; only the first
//! non-empty line is inspected so the explanation that follows cannot
//! trigger a different verdict.
//!
//! | Verdict | Move |
//! |---|---|
//! | `FORWARD` | forward 1.0 m |
//! | `SLOW` | forward 0.5 m |
//! | `OBSTACLE_LEFT` | strafe left 0.5 m (the left side is clear) |
//! | `OBSTACLE_RIGHT` | strafe right 0.5 m |
//! | `BLOCKED` ×1–2 | turn left 45° |
//! | `BLOCKED` ×3–4 | turn right 45° |
//! | `BLOCKED` ×5 | stop and give up |
//! | anything else | forward 0.5 m |

use spotlink_types::Direction;

/// Prompt sent with every camera frame.
pub const NAVIGATION_PROMPT: &str = "\
You help a walking robot navigate. Look at the camera view and answer with exactly one of:
- FORWARD: the path ahead is clear and safe
- SLOW: there may be obstacles, proceed with care
- OBSTACLE_LEFT: something blocks the way ahead but the left side is clear
- OBSTACLE_RIGHT: something blocks the way ahead but the right side is clear
- BLOCKED: every direction is blocked
Put the keyword alone on the first line, then briefly describe what you see.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Slow,
    ObstacleLeft,
    ObstacleRight,
    Blocked,
    Unknown,
}

impl Verdict {
    const KEYWORDS: [(&'static str, Verdict); 5] = [
        ("FORWARD", Verdict::Forward),
        ("SLOW", Verdict::Slow),
        ("OBSTACLE_LEFT", Verdict::ObstacleLeft),
        ("OBSTACLE_RIGHT", Verdict::ObstacleRight),
        ("BLOCKED", Verdict::Blocked),
    ];

    /// Classify a model answer by the earliest keyword on its first line.
    pub fn parse(answer: &str) -> Verdict {
        let Some(first) = answer.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Verdict::Unknown;
        };
        let first = first.to_ascii_uppercase();
        Self::KEYWORDS
            .iter()
            .filter_map(|(word, verdict)| first.find(word).map(|pos| (pos, *verdict)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, verdict)| verdict)
            .unwrap_or(Verdict::Unknown)
    }
}

/// What the agent should do next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// `length` is metres, or degrees for turns.
    Move { direction: Direction, length: f32 },
    /// Halt the robot and end the run.
    GiveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationPolicy {
    pub stride_m: f32,
    pub cautious_stride_m: f32,
    pub sidestep_m: f32,
    pub search_turn_deg: f32,
    /// Blocked answers in a row before turning the other way.
    pub turns_per_side: u32,
    consecutive_blocked: u32,
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self {
            stride_m: 1.0,
            cautious_stride_m: 0.5,
            sidestep_m: 0.5,
            search_turn_deg: 45.0,
            turns_per_side: 2,
            consecutive_blocked: 0,
        }
    }
}

impl NavigationPolicy {
    pub fn consecutive_blocked(&self) -> u32 {
        self.consecutive_blocked
    }

    pub fn decide(&mut self, verdict: Verdict) -> Decision {
        if verdict != Verdict::Blocked {
            self.consecutive_blocked = 0;
        }
        let (direction, length) = match verdict {
            Verdict::Forward => (Direction::Forward, self.stride_m),
            Verdict::Slow | Verdict::Unknown => (Direction::Forward, self.cautious_stride_m),
            Verdict::ObstacleLeft => (Direction::Left, self.sidestep_m),
            Verdict::ObstacleRight => (Direction::Right, self.sidestep_m),
            Verdict::Blocked => {
                self.consecutive_blocked += 1;
                let n = self.consecutive_blocked;
                if n <= self.turns_per_side {
                    (Direction::TurnLeft, self.search_turn_deg)
                } else if n <= 2 * self.turns_per_side {
                    (Direction::TurnRight, self.search_turn_deg)
                } else {
                    return Decision::GiveUp;
                }
            }
        };
        Decision::Move { direction, length }
    }
}
