use std::collections::{BTreeMap, BTreeSet};

use super::Candidate;
use crate::config::default_priority;
use crate::regime::{MarketCondition, RegimeKey};
use crate::types::StrategyId;

/// Picks which detectors run, in what order, for the current regime. The
/// regime table leads; every other enabled strategy follows in the default
/// order so nothing is starved outright.
pub struct Orchestrator {
    priority: BTreeMap<RegimeKey, Vec<StrategyId>>,
    enabled: BTreeSet<StrategyId>,
}

/// Outcome of a tick's detector sweep.
#[derive(Debug)]
pub enum Resolution {
    Winner(Candidate),
    /// Two detectors disagreed on direction with equal conviction; the
    /// tick emits nothing and the conflict is counted.
    Conflict {
        first: StrategyId,
        second: StrategyId,
    },
    NoSignal,
}

impl Orchestrator {
    pub fn new(priority: BTreeMap<RegimeKey, Vec<StrategyId>>, enabled: BTreeSet<StrategyId>) -> Self {
        Self { priority, enabled }
    }

    pub fn select(&self, condition: &MarketCondition) -> Vec<StrategyId> {
        let regime = condition.regime_key();
        let preferred = self
            .priority
            .get(&regime)
            .cloned()
            .unwrap_or_else(|| default_priority(regime));

        let mut ordered: Vec<StrategyId> = Vec::new();
        for id in preferred {
            if self.enabled.contains(&id) && !ordered.contains(&id) {
                ordered.push(id);
            }
        }
        for id in default_priority(RegimeKey::Default) {
            if self.enabled.contains(&id) && !ordered.contains(&id) {
                ordered.push(id);
            }
        }
        ordered
    }

    /// Resolve the candidates a tick produced, in priority order. The
    /// first emitter wins unless a higher-confidence candidate disagrees
    /// on direction; an exact tie between opposite directions discards
    /// both.
    pub fn resolve(mut candidates: Vec<Candidate>) -> Resolution {
        if candidates.is_empty() {
            return Resolution::NoSignal;
        }
        let first = candidates.remove(0);

        let best_opposing = candidates
            .into_iter()
            .filter(|c| c.direction != first.direction)
            .max_by_key(|c| c.confidence);

        match best_opposing {
            Some(opposing) if opposing.confidence > first.confidence => {
                Resolution::Winner(opposing)
            }
            Some(opposing) if opposing.confidence == first.confidence => Resolution::Conflict {
                first: first.strategy,
                second: opposing.strategy,
            },
            _ => Resolution::Winner(first),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{TrendStrength, Volatility};
    use crate::types::Direction;
    use rust_decimal_macros::dec;

    fn condition(key: RegimeKey) -> MarketCondition {
        MarketCondition {
            adx: if key == RegimeKey::StrongTrend { dec!(30) } else { dec!(18) },
            atr: dec!(1),
            atr_ratio: match key {
                RegimeKey::HighVolatility => dec!(1.6),
                RegimeKey::LowVolatility => dec!(0.7),
                _ => dec!(1),
            },
            volume_ratio: dec!(1),
            rsi: dec!(50),
            trend_strength: if key == RegimeKey::StrongTrend {
                TrendStrength::Strong
            } else {
                TrendStrength::Weak
            },
            volatility: match key {
                RegimeKey::HighVolatility => Volatility::High,
                RegimeKey::LowVolatility => Volatility::Low,
                _ => Volatility::Normal,
            },
            is_ranging: key == RegimeKey::Ranging,
        }
    }

    fn full_orchestrator() -> Orchestrator {
        let mut priority = BTreeMap::new();
        for key in [
            RegimeKey::StrongTrend,
            RegimeKey::Ranging,
            RegimeKey::HighVolatility,
            RegimeKey::LowVolatility,
            RegimeKey::Default,
        ] {
            priority.insert(key, default_priority(key));
        }
        Orchestrator::new(priority, StrategyId::all().into_iter().collect())
    }

    fn candidate(strategy: StrategyId, direction: Direction, confidence: u8) -> Candidate {
        Candidate::new(
            strategy,
            direction,
            dec!(100),
            if direction == Direction::Long { dec!(99) } else { dec!(101) },
            if direction == Direction::Long { dec!(102) } else { dec!(98) },
            confidence,
            "test".into(),
        )
        .unwrap()
    }

    #[test]
    fn test_strong_trend_prefers_confluence() {
        let orch = full_orchestrator();
        let order = orch.select(&condition(RegimeKey::StrongTrend));
        assert_eq!(order[0], StrategyId::TrendConfluence);
        assert_eq!(order[1], StrategyId::TrendAlignment);
        // Everything enabled eventually appears.
        assert_eq!(order.len(), StrategyId::all().len());
    }

    #[test]
    fn test_ranging_prefers_levels() {
        let orch = full_orchestrator();
        let order = orch.select(&condition(RegimeKey::Ranging));
        assert_eq!(order[0], StrategyId::SupportResistance);
        assert_eq!(order[1], StrategyId::MeanReversion);
    }

    #[test]
    fn test_disabled_strategies_are_dropped() {
        let mut priority = BTreeMap::new();
        priority.insert(RegimeKey::Ranging, default_priority(RegimeKey::Ranging));
        let enabled: BTreeSet<StrategyId> = StrategyId::all()
            .into_iter()
            .filter(|id| *id != StrategyId::SupportResistance)
            .collect();
        let orch = Orchestrator::new(priority, enabled);
        let order = orch.select(&condition(RegimeKey::Ranging));
        assert!(!order.contains(&StrategyId::SupportResistance));
        assert_eq!(order[0], StrategyId::MeanReversion);
    }

    #[test]
    fn test_first_emitter_wins() {
        let resolution = Orchestrator::resolve(vec![
            candidate(StrategyId::EmaCrossover, Direction::Long, 3),
            candidate(StrategyId::TrendAlignment, Direction::Long, 5),
        ]);
        match resolution {
            Resolution::Winner(c) => assert_eq!(c.strategy, StrategyId::EmaCrossover),
            other => panic!("expected winner, got {other:?}"),
        }
    }

    #[test]
    fn test_higher_confidence_opposite_takes_over() {
        let resolution = Orchestrator::resolve(vec![
            candidate(StrategyId::EmaCrossover, Direction::Long, 3),
            candidate(StrategyId::MeanReversion, Direction::Short, 4),
        ]);
        match resolution {
            Resolution::Winner(c) => assert_eq!(c.strategy, StrategyId::MeanReversion),
            other => panic!("expected winner, got {other:?}"),
        }
    }

    #[test]
    fn test_tied_opposites_discard_both() {
        let resolution = Orchestrator::resolve(vec![
            candidate(StrategyId::EmaCrossover, Direction::Long, 3),
            candidate(StrategyId::MeanReversion, Direction::Short, 3),
        ]);
        assert!(matches!(resolution, Resolution::Conflict { .. }));
    }
}
