//! Thin value -> color mapping for the renderer. Sequential blues for
//! absolute dollar columns, a diverging red/yellow/green scale centered on
//! zero for percentage columns.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

const BLUES: [Rgb; 3] = [Rgb(0xf7, 0xfb, 0xff), Rgb(0x6b, 0xae, 0xd6), Rgb(0x08, 0x30, 0x6b)];
const RED_YELLOW_GREEN: [Rgb; 3] = [Rgb(0xd7, 0x30, 0x27), Rgb(0xff, 0xff, 0xbf), Rgb(0x1a, 0x98, 0x50)];

/// Linear interpolation over a fixed stop palette between vmin and vmax.
#[derive(Debug, Clone)]
pub struct LinearColorScale {
    stops: Vec<Rgb>,
    vmin: f64,
    vmax: f64,
    pub caption: String,
}

impl LinearColorScale {
    /// Fit a scale to a numeric column. Percentage columns get a diverging
    /// palette with a symmetric range around zero; absolute columns get a
    /// sequential palette over the observed min/max.
    pub fn fit(column: &str, values: &[Decimal], is_percentage: bool) -> Self {
        let floats: Vec<f64> = values
            .iter()
            .map(|v| v.to_f64().unwrap_or(0.0))
            .collect();
        let min = floats.iter().copied().fold(f64::INFINITY, f64::min);
        let max = floats.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (vmin, vmax, stops, unit) = if is_percentage {
            let bound = min.abs().max(max.abs());
            (-bound, bound, RED_YELLOW_GREEN.to_vec(), "%")
        } else {
            (min, max, BLUES.to_vec(), "$")
        };
        let caption = format!("{} ({unit})", title_case(column));
        LinearColorScale {
            stops,
            vmin: if vmin.is_finite() { vmin } else { 0.0 },
            vmax: if vmax.is_finite() { vmax } else { 0.0 },
            caption,
        }
    }

    pub fn color(&self, value: Decimal) -> Rgb {
        let v = value.to_f64().unwrap_or(0.0);
        let span = self.vmax - self.vmin;
        let t = if span <= f64::EPSILON {
            0.5
        } else {
            ((v - self.vmin) / span).clamp(0.0, 1.0)
        };
        let segments = (self.stops.len() - 1) as f64;
        let position = t * segments;
        let index = (position.floor() as usize).min(self.stops.len() - 2);
        let local = position - index as f64;
        let a = self.stops[index];
        let b = self.stops[index + 1];
        Rgb(
            lerp(a.0, b.0, local),
            lerp(a.1, b.1, local),
            lerp(a.2, b.2, local),
        )
    }
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round() as u8
}

fn title_case(column: &str) -> String {
    column
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
