#![allow(dead_code)]
use rust_decimal::Decimal;

use crate::indicators::EnrichedCandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

/// A fractal swing point: a bar whose high (or low) is the extreme within
/// `k` bars on both sides.
#[derive(Debug, Clone, Copy)]
pub struct SwingPoint {
    pub index: usize,
    pub price: Decimal,
    pub kind: SwingKind,
}

/// Detect swing points over the rows using the fractal method. Bars within
/// `k` of either edge cannot qualify. Returned in index order.
pub fn swing_points(rows: &[EnrichedCandle], k: usize) -> Vec<SwingPoint> {
    let mut points = Vec::new();
    if rows.len() < 2 * k + 1 {
        return points;
    }

    for i in k..rows.len() - k {
        let window = &rows[i - k..=i + k];
        let high = rows[i].candle.high;
        let low = rows[i].candle.low;

        if window.iter().all(|r| r.candle.high <= high)
            && window
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != k)
                .all(|(_, r)| r.candle.high < high)
        {
            points.push(SwingPoint {
                index: i,
                price: high,
                kind: SwingKind::High,
            });
        }

        if window.iter().all(|r| r.candle.low >= low)
            && window
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != k)
                .all(|(_, r)| r.candle.low > low)
        {
            points.push(SwingPoint {
                index: i,
                price: low,
                kind: SwingKind::Low,
            });
        }
    }

    points
}

pub fn last_swing(points: &[SwingPoint], kind: SwingKind) -> Option<SwingPoint> {
    points.iter().rev().find(|p| p.kind == kind).copied()
}

/// The most recent `count` swings of `kind`, newest last.
pub fn recent_swings(points: &[SwingPoint], kind: SwingKind, count: usize) -> Vec<SwingPoint> {
    let mut swings: Vec<SwingPoint> = points
        .iter()
        .rev()
        .filter(|p| p.kind == kind)
        .take(count)
        .copied()
        .collect();
    swings.reverse();
    swings
}

/// True when the last `count` swing highs and lows both step upward
/// (an established uptrend), or downward when `rising` is false.
pub fn staircase(points: &[SwingPoint], count: usize, rising: bool) -> bool {
    let highs = recent_swings(points, SwingKind::High, count);
    let lows = recent_swings(points, SwingKind::Low, count);
    if highs.len() < count || lows.len() < count {
        return false;
    }
    let ordered = |swings: &[SwingPoint]| {
        swings.windows(2).all(|w| {
            if rising {
                w[1].price > w[0].price
            } else {
                w[1].price < w[0].price
            }
        })
    };
    ordered(&highs) && ordered(&lows)
}

/// A horizontal level formed by clustered swing points.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub touches: usize,
}

/// Cluster swing prices within `tolerance_pct` percent into levels.
pub fn cluster_levels(points: &[SwingPoint], tolerance_pct: Decimal) -> Vec<PriceLevel> {
    let mut prices: Vec<Decimal> = points.iter().map(|p| p.price).collect();
    prices.sort();

    let mut levels: Vec<PriceLevel> = Vec::new();
    let hundred = Decimal::from(100);
    for price in prices {
        match levels.last_mut() {
            Some(level)
                if !level.price.is_zero()
                    && ((price - level.price).abs() / level.price * hundred) <= tolerance_pct =>
            {
                // Running mean keeps the level centered on its touches.
                let n = Decimal::from(level.touches as u32);
                level.price = (level.price * n + price) / (n + Decimal::ONE);
                level.touches += 1;
            }
            _ => levels.push(PriceLevel { price, touches: 1 }),
        }
    }
    levels
}

/// Whether `price` sits within `tolerance_pct` percent of `level`.
pub fn near_level(price: Decimal, level: Decimal, tolerance_pct: Decimal) -> bool {
    if level.is_zero() {
        return false;
    }
    (price - level).abs() / level * Decimal::from(100) <= tolerance_pct
}

/// Whether `price` is within tolerance of a multiple of `unit`.
pub fn near_round_number(price: Decimal, unit: Decimal, tolerance_pct: Decimal) -> bool {
    if unit.is_zero() || price.is_zero() {
        return false;
    }
    let nearest = (price / unit).round() * unit;
    near_level(price, nearest, tolerance_pct)
}
