use bigdecimal::ToPrimitive;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::strategies::relative_diff;
use crate::config::ExtractionConfig;
use crate::models::{Decision, Entity, ScoredCandidate, StrategyKind, ValueCandidate};

/// 某个候选 (按原文偏移聚合) 收到的全部投票
#[derive(Debug, Clone)]
struct Ballot<'a> {
    candidate: &'a ValueCandidate,
    weighted_sum: f64,
    weight_total: f64,
    votes: Vec<(StrategyKind, f64)>, // (策略, confidence * weight)
}

impl<'a> Ballot<'a> {
    fn new(candidate: &'a ValueCandidate) -> Self {
        Self {
            candidate,
            weighted_sum: 0.0,
            weight_total: 0.0,
            votes: Vec::new(),
        }
    }

    /// 加权得票率：分母为本实体所有适用策略的权重，弃权即记 0 票
    fn vote_score(&self, panel_weight: f64) -> f64 {
        let denominator = panel_weight.max(self.weight_total);
        if denominator > 0.0 {
            self.weighted_sum / denominator
        } else {
            0.0
        }
    }

    /// 贡献从大到小排列的策略标签
    fn method_label(&self) -> String {
        let mut votes = self.votes.clone();
        votes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        votes
            .iter()
            .map(|(kind, _)| kind.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// 单个候选的最终评分明细
#[derive(Debug, Clone)]
struct Tally<'a> {
    ballot: Ballot<'a>,
    plausibility: f64,
    agreement: f64,
    corroborators: usize,
    score: f64,
}

/// 融合结果：未达阈值时 `decision` 为空，`best_score` 仍保留用于诊断
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    pub decision: Option<Decision>,
    pub best_score: Option<f64>,
}

/// 集成融合 - 加权投票 + 合理性加分 + 一致性加分
pub struct EnsembleFusion<'a> {
    config: &'a ExtractionConfig,
}

impl<'a> EnsembleFusion<'a> {
    pub fn new(config: &'a ExtractionConfig) -> Self {
        Self { config }
    }

    /// `panel` 为对该实体适用的策略集合 (决定投票分母)
    pub fn fuse(&self, entity: &Entity, scored: &[ScoredCandidate], panel: &[StrategyKind]) -> FusionOutcome {
        let panel_weight: f64 = panel.iter().map(|kind| self.config.weight(*kind)).sum();

        // Step 1-2: 按候选聚合 confidence * weight
        let mut ballots: BTreeMap<usize, Ballot<'_>> = BTreeMap::new();
        for sc in scored {
            let weight = self.config.weight(sc.method);
            if weight <= 0.0 {
                continue;
            }
            let ballot = ballots
                .entry(sc.candidate.offset)
                .or_insert_with(|| Ballot::new(&sc.candidate));
            ballot.weighted_sum += sc.confidence * weight;
            ballot.weight_total += weight;
            ballot.votes.push((sc.method, sc.confidence * weight));
        }

        if ballots.is_empty() {
            return FusionOutcome {
                decision: None,
                best_score: None,
            };
        }

        let ballots: Vec<Ballot<'_>> = ballots.into_values().collect();

        // Step 3-4: 合理性加分 + 一致性加分
        let tallies: Vec<Tally<'_>> = ballots
            .iter()
            .enumerate()
            .map(|(i, ballot)| {
                let plausibility = self.plausibility_bonus(ballot.candidate);
                let corroborators = self.corroborators(i, &ballots);
                let agreement = if corroborators > 0 {
                    self.config.fusion.agreement_bonus
                } else {
                    0.0
                };
                let score = ballot.vote_score(panel_weight) + plausibility + agreement;
                Tally {
                    ballot: ballot.clone(),
                    plausibility,
                    agreement,
                    corroborators,
                    score,
                }
            })
            .collect();

        // Step 5: 最高分 (未截断) 胜出；同分取距离更近、位置更靠前者
        let Some(best) = tallies.iter().reduce(|best, t| {
            match t.score.partial_cmp(&best.score).unwrap_or(Ordering::Equal) {
                Ordering::Greater => t,
                Ordering::Equal
                    if t.ballot.candidate.distance_from_entity < best.ballot.candidate.distance_from_entity =>
                {
                    t
                }
                _ => best,
            }
        }) else {
            return FusionOutcome {
                decision: None,
                best_score: None,
            };
        };

        let confidence = best.score.min(1.0);
        if confidence < self.config.fusion.min_confidence {
            tracing::debug!(
                "{}: best candidate '{}' scored {:.3}, below threshold {:.2}",
                entity.code,
                best.ballot.candidate.raw_text,
                confidence,
                self.config.fusion.min_confidence
            );
            return FusionOutcome {
                decision: None,
                best_score: Some(confidence),
            };
        }

        let candidate = best.ballot.candidate;
        let reasoning = format!(
            "'{}' at {} bytes from {}: vote {:.3} from {} of {} candidate(s), plausibility +{:.2}, agreement +{:.2} ({} corroborating)",
            candidate.raw_text,
            candidate.distance_from_entity,
            entity.code,
            best.ballot.vote_score(panel_weight),
            best.ballot.method_label(),
            tallies.len(),
            best.plausibility,
            best.agreement,
            best.corroborators,
        );

        FusionOutcome {
            decision: Some(Decision {
                entity_code: entity.code.clone(),
                value: candidate.parsed_value.clone(),
                confidence,
                method: best.ballot.method_label(),
                reasoning,
                currency: candidate.currency_hint.clone(),
                line: candidate.line,
                corroborated: best.corroborators > 0,
            }),
            best_score: Some(confidence),
        }
    }

    /// 典型金额区间 / 非整十万 加分
    fn plausibility_bonus(&self, candidate: &ValueCandidate) -> f64 {
        let fusion = &self.config.fusion;
        let Some(value) = candidate.parsed_value.to_f64() else {
            return 0.0;
        };

        let mut bonus = 0.0;
        if value >= fusion.typical_min && value <= fusion.typical_max {
            bonus += fusion.typical_bonus;
        }
        if (value % fusion.round_unit).abs() > 1e-6 {
            bonus += fusion.non_round_bonus;
        }
        bonus
    }

    /// 其他候选中与之相差不超过容差的数量
    fn corroborators(&self, i: usize, ballots: &[Ballot<'_>]) -> usize {
        let value = &ballots[i].candidate.parsed_value;
        ballots
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter(|(_, other)| {
                relative_diff(value, &other.candidate.parsed_value)
                    .map_or(false, |d| d <= self.config.fusion.agreement_tolerance)
            })
            .count()
    }
}
