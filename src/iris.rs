//! Figures of the Iris dashboard, as plain data.

use crate::error::{Error, Result};
use crate::loader::read_source;
use crate::pivot::{Slice, SliceTable};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;

lazy_static! {
    static ref CAMEL_WORD: Regex = Regex::new(r"[A-Z][^A-Z]*").unwrap();
}

/// Splits a CamelCase column name into words and drops the trailing unit:
/// `SepalLengthCm` becomes `Sepal Length`.
pub fn humanize(column: &str) -> String {
    let mut words: Vec<&str> = CAMEL_WORD.find_iter(column).map(|m| m.as_str()).collect();
    if words.len() > 1 {
        words.pop();
    }
    words.join(" ")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SepalLength,
    SepalWidth,
    PetalLength,
    PetalWidth,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::SepalLength,
        Feature::SepalWidth,
        Feature::PetalLength,
        Feature::PetalWidth,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Feature::SepalLength => "SepalLengthCm",
            Feature::SepalWidth => "SepalWidthCm",
            Feature::PetalLength => "PetalLengthCm",
            Feature::PetalWidth => "PetalWidthCm",
        }
    }

    pub fn label(&self) -> String {
        humanize(self.column())
    }

    pub fn of(&self, flower: &Flower) -> f64 {
        match self {
            Feature::SepalLength => flower.sepal_length,
            Feature::SepalWidth => flower.sepal_width,
            Feature::PetalLength => flower.petal_length,
            Feature::PetalWidth => flower.petal_width,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IrisRecord {
    #[serde(rename = "Id")]
    id: u32,
    #[serde(rename = "SepalLengthCm")]
    sepal_length: f64,
    #[serde(rename = "SepalWidthCm")]
    sepal_width: f64,
    #[serde(rename = "PetalLengthCm")]
    petal_length: f64,
    #[serde(rename = "PetalWidthCm")]
    petal_width: f64,
    #[serde(rename = "Species")]
    species: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Flower {
    pub id: u32,
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
    /// `setosa` for a `Iris-setosa` species value.
    pub flower_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScatterSeries {
    pub flower: String,
    pub points: Vec<ScatterPoint>,
}

/// Counts per flower over bins shared by all flowers; `edges` has one more
/// entry than each `counts` vector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Histogram {
    pub feature: Feature,
    pub edges: Vec<f64>,
    pub counts: Vec<(String, Vec<u32>)>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoxStats {
    pub flower: String,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// Everything the Iris page shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IrisFigures {
    pub sepal_length_vs_petal_length: Vec<ScatterSeries>,
    pub sepal_width_vs_petal_width: Vec<ScatterSeries>,
    pub sepal_length_histogram: Histogram,
    pub sepal_width_boxes: Vec<BoxStats>,
    pub species: SliceTable,
    pub correlation: CorrelationMatrix,
}

const HISTOGRAM_BINS: usize = 20;

pub struct IrisTable {
    flowers: Vec<Flower>,
}

impl IrisTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let mut flowers = Vec::new();
        for record in csv.deserialize::<IrisRecord>() {
            let record = record?;
            let flower_name = match record.species.split_once('-') {
                Some((_, name)) => name.to_string(),
                None => record.species.clone(),
            };
            flowers.push(Flower {
                id: record.id,
                sepal_length: record.sepal_length,
                sepal_width: record.sepal_width,
                petal_length: record.petal_length,
                petal_width: record.petal_width,
                flower_name,
            });
        }
        if flowers.is_empty() {
            return Err(Error::Schema("iris dataset has no rows".to_string()));
        }
        Ok(IrisTable { flowers })
    }

    pub fn load(source: &str) -> Result<Self> {
        let text = read_source(source)?;
        Self::from_reader(text.as_bytes())
    }

    pub fn flowers(&self) -> &[Flower] {
        &self.flowers
    }

    /// Distinct flower names in order of first appearance.
    pub fn flower_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for flower in &self.flowers {
            if !names.contains(&flower.flower_name) {
                names.push(flower.flower_name.clone());
            }
        }
        names
    }

    fn values_of<'a>(&'a self, name: &'a str, feature: Feature) -> impl Iterator<Item = f64> + 'a {
        self.flowers
            .iter()
            .filter(move |flower| flower.flower_name == name)
            .map(move |flower| feature.of(flower))
    }

    pub fn scatter(&self, x: Feature, y: Feature, size: Feature) -> Vec<ScatterSeries> {
        self.flower_names()
            .into_iter()
            .map(|name| {
                let points = self
                    .flowers
                    .iter()
                    .filter(|flower| flower.flower_name == name)
                    .map(|flower| ScatterPoint {
                        x: x.of(flower),
                        y: y.of(flower),
                        size: size.of(flower),
                    })
                    .collect();
                ScatterSeries { flower: name, points }
            })
            .collect()
    }

    pub fn histogram(&self, feature: Feature, bins: usize) -> Histogram {
        let bins = bins.max(1);
        let (min, max) = self
            .flowers
            .iter()
            .map(|flower| feature.of(flower))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let width = if max > min { (max - min) / bins as f64 } else { 1.0 };
        let edges = (0..=bins).map(|i| min + width * i as f64).collect();

        let counts = self
            .flower_names()
            .into_iter()
            .map(|name| {
                let mut counts = vec![0u32; bins];
                for value in self.values_of(&name, feature) {
                    let bin = (((value - min) / width).floor() as usize).min(bins - 1);
                    counts[bin] += 1;
                }
                (name, counts)
            })
            .collect();

        Histogram {
            feature,
            edges,
            counts,
        }
    }

    pub fn box_stats(&self, feature: Feature) -> Vec<BoxStats> {
        self.flower_names()
            .into_iter()
            .filter_map(|name| {
                let mut values: Vec<f64> = self.values_of(&name, feature).collect();
                values.sort_by(f64::total_cmp);
                let (min, max) = (*values.first()?, *values.last()?);
                Some(BoxStats {
                    min,
                    q1: quantile(&values, 0.25),
                    median: quantile(&values, 0.5),
                    q3: quantile(&values, 0.75),
                    max,
                    flower: name,
                })
            })
            .collect()
    }

    pub fn species_counts(&self) -> SliceTable {
        let slices = self
            .flower_names()
            .into_iter()
            .map(|name| {
                let count = self.flowers.iter().filter(|f| f.flower_name == name).count();
                Slice {
                    label: name,
                    value: count as f64,
                }
            })
            .collect();
        SliceTable { slices }
    }

    /// Pearson correlation between the four measurements.
    pub fn correlation(&self) -> CorrelationMatrix {
        let columns: Vec<Vec<f64>> = Feature::ALL
            .iter()
            .map(|feature| self.flowers.iter().map(|flower| feature.of(flower)).collect())
            .collect();
        let values = columns
            .iter()
            .map(|a| columns.iter().map(|b| pearson(a, b)).collect())
            .collect();
        CorrelationMatrix {
            labels: Feature::ALL.iter().map(Feature::label).collect(),
            values,
        }
    }

    pub fn figures(&self) -> IrisFigures {
        IrisFigures {
            sepal_length_vs_petal_length: self.scatter(
                Feature::SepalLength,
                Feature::PetalLength,
                Feature::PetalWidth,
            ),
            sepal_width_vs_petal_width: self.scatter(
                Feature::SepalWidth,
                Feature::PetalWidth,
                Feature::PetalLength,
            ),
            sepal_length_histogram: self.histogram(Feature::SepalLength, HISTOGRAM_BINS),
            sepal_width_boxes: self.box_stats(Feature::SepalWidth),
            species: self.species_counts(),
            correlation: self.correlation(),
        }
    }
}

// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}
