//! Point lookup and weighted aggregation.
//!
//! Category scores are the mean points over every question in the category
//! (unanswered questions count as zero). The overall score is the mean of the
//! category scores weighted by each category's weight and normalized by the
//! weights actually present, so category size never dilutes a score.

use std::collections::BTreeMap;

use serde::Serialize;

use super::catalog::Catalog;
use super::domain::{match_option, AnswerOption, CategoryId, OptionValue, QuestionId};

/// Points for the fixed answer labels when no option matches.
pub const LABEL_POINTS: [(&str, f64); 3] = [("Si", 5.0), ("En Parte", 3.0), ("No", 1.0)];

/// Top of the label scale, used as the maximum when no option defines points.
const LABEL_MAXIMUM: f64 = 5.0;

/// Points earned by `answer` against the loaded options.
///
/// A matching option yields its `points`, else its numeric value, else 0.
/// Without a matching option the label table applies, defaulting to 0.
pub fn points_for_answer(answer: &OptionValue, options: &[AnswerOption]) -> f64 {
    match match_option(options, answer) {
        Some(option) => option
            .points
            .filter(|points| points.is_finite())
            .or_else(|| option.value.as_number())
            .unwrap_or(0.0),
        None => {
            let label = answer.coerced();
            LABEL_POINTS
                .iter()
                .find(|(name, _)| *name == label)
                .map_or(0.0, |(_, points)| *points)
        }
    }
}

pub fn format_score(value: f64) -> String {
    format!("{value:.2}")
}

/// Qualitative rating for a percentage of the maximum score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Excellent,
    VeryGood,
    Good,
    Fair,
    NeedsImprovement,
}

impl ScoreBand {
    pub fn from_percentage(percentage: f64) -> Self {
        match percentage {
            p if p >= 90.0 => Self::Excellent,
            p if p >= 75.0 => Self::VeryGood,
            p if p >= 60.0 => Self::Good,
            p if p >= 40.0 => Self::Fair,
            _ => Self::NeedsImprovement,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excelente",
            Self::VeryGood => "Muy Bueno",
            Self::Good => "Bueno",
            Self::Fair => "Regular",
            Self::NeedsImprovement => "Necesita Mejorar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryResult {
    pub category_id: CategoryId,
    pub name: String,
    pub score: String,
    pub average: f64,
    pub percentage: f64,
    pub weight: f64,
    pub band: ScoreBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub categories: Vec<CategoryResult>,
    pub total: String,
    pub average: f64,
    pub percentage: f64,
    pub band: ScoreBand,
    /// Computed over reference data that failed to load or is empty.
    pub provisional: bool,
}

pub struct ScoreCalculator<'a> {
    catalog: &'a Catalog,
    answers: &'a BTreeMap<QuestionId, OptionValue>,
    provisional: bool,
}

impl<'a> ScoreCalculator<'a> {
    pub fn new(catalog: &'a Catalog, answers: &'a BTreeMap<QuestionId, OptionValue>) -> Self {
        Self {
            catalog,
            answers,
            provisional: catalog.is_empty(),
        }
    }

    pub fn provisional(mut self, provisional: bool) -> Self {
        self.provisional = self.provisional || provisional;
        self
    }

    fn question_points(&self, question: QuestionId) -> f64 {
        match self.answers.get(&question) {
            Some(answer) if !answer.is_empty() => {
                points_for_answer(answer, self.catalog.options())
            }
            _ => 0.0,
        }
    }

    /// Mean points over the category's questions; 0 for an empty category.
    pub fn category_average(&self, id: CategoryId) -> f64 {
        let questions = self.catalog.questions_for(id);
        if questions.is_empty() {
            return 0.0;
        }
        let total: f64 = questions
            .iter()
            .map(|question| self.question_points(question.id))
            .sum();
        total / questions.len() as f64
    }

    pub fn category_score(&self, id: CategoryId) -> String {
        format_score(self.category_average(id))
    }

    /// Weighted mean of category averages over categories with questions.
    pub fn total_average(&self) -> f64 {
        let (weighted, weights) = self
            .catalog
            .categories()
            .iter()
            .filter(|category| !self.catalog.questions_for(category.id).is_empty())
            .fold((0.0, 0.0), |(weighted, weights), category| {
                let factor = category.weight() / 100.0;
                (
                    weighted + self.category_average(category.id) * factor,
                    weights + factor,
                )
            });

        if weights == 0.0 {
            0.0
        } else {
            weighted / weights
        }
    }

    pub fn total_score(&self) -> String {
        format_score(self.total_average())
    }

    /// Largest point value any option can earn.
    pub fn max_points(&self) -> f64 {
        self.catalog
            .options()
            .iter()
            .filter_map(|option| option.points.or_else(|| option.value.as_number()))
            .filter(|points| points.is_finite())
            .fold(None, |best: Option<f64>, points| {
                Some(best.map_or(points, |best| best.max(points)))
            })
            .filter(|best| *best > 0.0)
            .unwrap_or(LABEL_MAXIMUM)
    }

    fn percentage(&self, average: f64) -> f64 {
        average / self.max_points() * 100.0
    }

    pub fn summary(&self) -> ScoreSummary {
        let categories = self
            .catalog
            .categories()
            .iter()
            .map(|category| {
                let average = self.category_average(category.id);
                let percentage = self.percentage(average);
                CategoryResult {
                    category_id: category.id,
                    name: category.name.clone(),
                    score: format_score(average),
                    average,
                    percentage,
                    weight: category.weight(),
                    band: ScoreBand::from_percentage(percentage),
                }
            })
            .collect();

        let average = self.total_average();
        let percentage = self.percentage(average);
        ScoreSummary {
            categories,
            total: format_score(average),
            average,
            percentage,
            band: ScoreBand::from_percentage(percentage),
            provisional: self.provisional,
        }
    }
}
