//! Co-occurrence edge weighting
//!
//! Quantifies how strongly two concepts relate across the corpus of
//! processed blocks. The combined weight blends co-occurrence frequency,
//! pointwise mutual information and token distance, floored at 0.1 so every
//! observed relation stays visible and traversable.

use std::collections::{BTreeSet, HashMap};

/// Weight blend: 40% frequency, 30% PMI, 30% distance
const FREQ_SHARE: f64 = 0.4;
const PMI_SHARE: f64 = 0.3;
const DIST_SHARE: f64 = 0.3;

/// Characteristic token distance for concept proximity
const DISTANCE_SCALE: f64 = 50.0;

/// Base weight when a pair only ever co-occurs across different blocks
const CROSS_BLOCK_WEIGHT: f64 = 0.3;

/// Floor for any observed pair
const MIN_COMBINED_WEIGHT: f64 = 0.1;

/// Accumulates entity positions and pair co-occurrence over processed blocks
#[derive(Debug, Default)]
pub struct GraphWeightCalculator {
    /// entity -> (block index, token index) occurrences
    positions: HashMap<String, Vec<(usize, usize)>>,
    /// unordered entity pair -> number of blocks where both occurred
    cooccurrence: HashMap<(String, String), usize>,
}

impl GraphWeightCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one block: entity token positions and pairwise co-occurrence
    ///
    /// Position matching is word-level and partial in both directions, so a
    /// component word of a multi-word entity still anchors a position.
    pub fn observe(&mut self, block_text: &str, entities: &[String], block_index: usize) {
        let lower = block_text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();

        for entity in entities {
            let entity_lower = entity.to_lowercase();
            let found: Vec<(usize, usize)> = words
                .iter()
                .enumerate()
                .filter(|(_, word)| entity_lower.contains(*word) || word.contains(entity_lower.as_str()))
                .map(|(i, _)| (block_index, i))
                .collect();
            self.positions.entry(entity.clone()).or_default().extend(found);
        }

        let unique: BTreeSet<&String> = entities.iter().collect();
        let unique: Vec<&String> = unique.into_iter().collect();
        for (i, first) in unique.iter().enumerate() {
            for second in &unique[i + 1..] {
                let key = pair_key(first, second);
                *self.cooccurrence.entry(key).or_insert(0) += 1;
            }
        }
    }

    /// Number of blocks where the pair co-occurred
    pub fn cooccurrence_count(&self, a: &str, b: &str) -> usize {
        self.cooccurrence.get(&pair_key(a, b)).copied().unwrap_or(0)
    }

    /// Pointwise mutual information, squashed to [0, 1]
    ///
    /// `log2(P(a,b) / (P(a)·P(b)))` passed through a logistic function.
    /// Returns 0 if the pair never co-occurs or either marginal is zero.
    pub fn pmi(&self, a: &str, b: &str, total_blocks: usize) -> f64 {
        if total_blocks == 0 {
            return 0.0;
        }
        let cooccur = self.cooccurrence_count(a, b);
        if cooccur == 0 {
            return 0.0;
        }

        let blocks_with_a = self.blocks_containing(a);
        let blocks_with_b = self.blocks_containing(b);
        if blocks_with_a == 0 || blocks_with_b == 0 {
            return 0.0;
        }

        let total = total_blocks as f64;
        let p_xy = cooccur as f64 / total;
        let p_x = blocks_with_a as f64 / total;
        let p_y = blocks_with_b as f64 / total;

        let pmi = (p_xy / (p_x * p_y)).log2();
        1.0 / (1.0 + (-pmi / 2.0).exp())
    }

    /// Exponential decay over the average same-block token distance
    ///
    /// Returns 0.3 when the pair only ever co-occurs across different
    /// blocks, and 0 when either entity has no recorded position.
    pub fn distance_weight(&self, a: &str, b: &str) -> f64 {
        let Some(positions_a) = self.positions.get(a) else {
            return 0.0;
        };
        let Some(positions_b) = self.positions.get(b) else {
            return 0.0;
        };
        if positions_a.is_empty() || positions_b.is_empty() {
            return 0.0;
        }

        let mut distances = Vec::new();
        for (block_a, word_a) in positions_a {
            for (block_b, word_b) in positions_b {
                if block_a == block_b {
                    distances.push(word_a.abs_diff(*word_b));
                }
            }
        }

        if distances.is_empty() {
            return CROSS_BLOCK_WEIGHT;
        }

        let avg = distances.iter().sum::<usize>() as f64 / distances.len() as f64;
        (-avg / DISTANCE_SCALE).exp().min(1.0)
    }

    /// Blended weight in [0.1, 1.0], rounded to three decimals
    pub fn combined_weight(&self, a: &str, b: &str, total_blocks: usize) -> f64 {
        let cooccur = self.cooccurrence_count(a, b);
        if cooccur == 0 {
            return MIN_COMBINED_WEIGHT;
        }

        let max_cooccur = self.cooccurrence.values().copied().max().unwrap_or(1);
        let freq_weight = cooccur as f64 / max_cooccur as f64;

        let combined = FREQ_SHARE * freq_weight
            + PMI_SHARE * self.pmi(a, b, total_blocks)
            + DIST_SHARE * self.distance_weight(a, b);

        (combined.clamp(MIN_COMBINED_WEIGHT, 1.0) * 1000.0).round() / 1000.0
    }

    fn blocks_containing(&self, entity: &str) -> usize {
        self.positions
            .get(entity)
            .map(|positions| {
                positions
                    .iter()
                    .map(|(block, _)| *block)
                    .collect::<BTreeSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }
}

/// Canonical unordered pair key
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unobserved_pair_gets_floor_weight() {
        let mut calc = GraphWeightCalculator::new();
        calc.observe("осознавание ведёт к ясности", &entities(&["осознавание"]), 0);
        calc.observe("присутствие и ясность", &entities(&["присутствие"]), 1);

        assert_eq!(calc.combined_weight("осознавание", "присутствие", 2), 0.1);
    }

    #[test]
    fn test_close_frequent_pair_weighs_heavier() {
        let mut calc = GraphWeightCalculator::new();
        for block in 0..4 {
            calc.observe(
                "метанаблюдение раскрывает присутствие",
                &entities(&["метанаблюдение", "присутствие"]),
                block,
            );
        }

        let weight = calc.combined_weight("метанаблюдение", "присутствие", 4);
        assert!(weight > 0.3, "weight was {weight}");
        assert!(weight <= 1.0);
    }

    #[test]
    fn test_pmi_zero_without_cooccurrence() {
        let mut calc = GraphWeightCalculator::new();
        calc.observe("осознавание", &entities(&["осознавание"]), 0);

        assert_eq!(calc.pmi("осознавание", "присутствие", 1), 0.0);
        assert_eq!(calc.pmi("осознавание", "присутствие", 0), 0.0);
    }

    #[test]
    fn test_pmi_high_for_always_together() {
        let mut calc = GraphWeightCalculator::new();
        for block in 0..3 {
            calc.observe(
                "разотождествление освобождает свидетеля",
                &entities(&["разотождествление", "свидетель"]),
                block,
            );
        }

        // P(a,b) = P(a) = P(b) = 1 -> pmi = 0 -> logistic(0) = 0.5
        let pmi = calc.pmi("разотождествление", "свидетель", 3);
        assert!((pmi - 0.5).abs() < 1e-9, "pmi was {pmi}");
    }

    #[test]
    fn test_distance_weight_decays() {
        let mut calc = GraphWeightCalculator::new();
        calc.observe(
            "осознавание присутствие",
            &entities(&["осознавание", "присутствие"]),
            0,
        );
        let near = calc.distance_weight("осознавание", "присутствие");

        let mut far_calc = GraphWeightCalculator::new();
        let filler = "слово ".repeat(80);
        let far_text = format!("осознавание {filler} присутствие");
        far_calc.observe(&far_text, &entities(&["осознавание", "присутствие"]), 0);
        let far = far_calc.distance_weight("осознавание", "присутствие");

        assert!(near > far, "near={near} far={far}");
    }

    #[test]
    fn test_distance_weight_cross_block_floor() {
        let mut calc = GraphWeightCalculator::new();
        calc.observe("осознавание растёт", &entities(&["осознавание"]), 0);
        calc.observe("присутствие углубляется", &entities(&["присутствие"]), 1);

        assert_eq!(calc.distance_weight("осознавание", "присутствие"), 0.3);
        assert_eq!(calc.distance_weight("осознавание", "неизвестное"), 0.0);
    }

    #[test]
    fn test_pair_key_is_unordered() {
        let mut calc = GraphWeightCalculator::new();
        calc.observe(
            "метанаблюдение раскрывает присутствие",
            &entities(&["присутствие", "метанаблюдение"]),
            0,
        );

        assert_eq!(calc.cooccurrence_count("метанаблюдение", "присутствие"), 1);
        assert_eq!(calc.cooccurrence_count("присутствие", "метанаблюдение"), 1);
    }
}
