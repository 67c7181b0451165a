//! Task mix and synthetic records for the concurrency stress test.

use std::time::{SystemTime, UNIX_EPOCH};

use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::Rng;

use crate::data::Review;

/// One independent unit of work in the concurrent harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Read,
    Write,
    Update,
}

/// Draw the task mix up front: 60% reads by random ID, 20% writes of a
/// synthetic record, 20% updates of a random ID.
pub fn generate_task_mix<R: Rng>(num_operations: usize, rng: &mut R) -> Vec<TaskKind> {
    (0..num_operations)
        .map(|_| {
            let roll: f64 = rng.gen();
            if roll < 0.6 {
                TaskKind::Read
            } else if roll < 0.8 {
                TaskKind::Write
            } else {
                TaskKind::Update
            }
        })
        .collect()
}

pub fn synthetic_review<R: Rng>(rng: &mut R) -> Review {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Review {
        product_id: format!("Product{}", rng.gen_range(1..=1000)),
        user_id: format!("User{}", rng.gen_range(1..=1000)),
        profile_name: Name().fake_with_rng(rng),
        helpfulness: "0/0".to_string(),
        score: rng.gen_range(1.0..=5.0),
        review_time: now,
        summary: Sentence(1..4).fake_with_rng(rng),
        review_text: "Sample review text generated for the concurrency stress test.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn mix_has_exactly_the_requested_length() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(generate_task_mix(0, &mut rng).len(), 0);
        assert_eq!(generate_task_mix(1, &mut rng).len(), 1);
        assert_eq!(generate_task_mix(257, &mut rng).len(), 257);
    }

    #[test]
    fn mix_roughly_follows_60_20_20() {
        let mut rng = StdRng::seed_from_u64(42);
        let mix = generate_task_mix(10_000, &mut rng);
        let reads = mix.iter().filter(|k| **k == TaskKind::Read).count();
        let writes = mix.iter().filter(|k| **k == TaskKind::Write).count();
        let updates = mix.iter().filter(|k| **k == TaskKind::Update).count();
        assert_eq!(reads + writes + updates, 10_000);
        assert!((5500..6500).contains(&reads), "reads = {reads}");
        assert!((1500..2500).contains(&writes), "writes = {writes}");
        assert!((1500..2500).contains(&updates), "updates = {updates}");
    }

    #[test]
    fn synthetic_review_has_sane_fields() {
        let mut rng = StdRng::seed_from_u64(1);
        let review = synthetic_review(&mut rng);
        assert!((1.0..=5.0).contains(&review.score));
        assert!(review.product_id.starts_with("Product"));
        assert_eq!(review.helpfulness, "0/0");
        assert!(review.review_time > 0);
    }
}
