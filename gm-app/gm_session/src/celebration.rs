//! Confetti burst shown when a GM confirms.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

const PIECES: usize = 30;
const EMOJIS: [&str; 5] = ["🎉", "⭐", "🌟", "✨", "🎊"];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfettiPiece {
    pub emoji: &'static str,
    /// Seconds before the piece starts moving.
    pub delay: f64,
    /// Seconds the fall lasts.
    pub duration: f64,
    /// Horizontal drift in pixels.
    pub x: f64,
    /// Final rotation in degrees.
    pub rotate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Celebration {
    pub pieces: Vec<ConfettiPiece>,
}

impl Celebration {
    pub fn burst<R: Rng>(rng: &mut R) -> Self {
        let pieces = (0..PIECES)
            .map(|_| ConfettiPiece {
                emoji: EMOJIS.choose(rng).copied().unwrap_or("🎉"),
                delay: rng.gen_range(0.0..0.1),
                duration: rng.gen_range(2.0..2.5),
                x: rng.gen_range(-150.0..150.0),
                rotate: rng.gen_range(0.0..720.0),
            })
            .collect();
        Celebration { pieces }
    }

    /// One-line rendering for terminals.
    pub fn render(&self) -> String {
        self.pieces.iter().map(|p| p.emoji).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn burst_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let celebration = Celebration::burst(&mut rng);
        assert_eq!(celebration.pieces.len(), PIECES);
        for piece in &celebration.pieces {
            assert!(EMOJIS.contains(&piece.emoji));
            assert!((0.0..0.1).contains(&piece.delay));
            assert!((2.0..2.5).contains(&piece.duration));
            assert!((-150.0..150.0).contains(&piece.x));
            assert!((0.0..720.0).contains(&piece.rotate));
        }
        assert_eq!(celebration.render().chars().count(), PIECES);
    }
}
