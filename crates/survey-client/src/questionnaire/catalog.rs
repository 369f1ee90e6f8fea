use std::collections::HashMap;

use super::domain::{AnswerOption, Category, CategoryId, Question, QuestionId};

/// Read-only reference data for one load: categories, questions, and options,
/// each sorted by `order` with questions grouped under their category.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: Vec<Category>,
    questions: Vec<Question>,
    options: Vec<AnswerOption>,
    by_category: HashMap<CategoryId, Vec<Question>>,
}

impl Catalog {
    pub fn assemble(
        mut categories: Vec<Category>,
        mut questions: Vec<Question>,
        mut options: Vec<AnswerOption>,
    ) -> Self {
        // sort_by_key is stable, so equal (or missing) orders keep response order.
        categories.sort_by_key(|category| category.order.unwrap_or(0));
        questions.sort_by_key(|question| question.order.unwrap_or(0));
        options.sort_by_key(|option| option.order.unwrap_or(0));

        let mut by_category: HashMap<CategoryId, Vec<Question>> = categories
            .iter()
            .map(|category| (category.id, Vec::new()))
            .collect();
        for question in &questions {
            if let Some(group) = by_category.get_mut(&question.category_id) {
                group.push(question.clone());
            }
        }

        Self {
            categories,
            questions,
            options,
            by_category,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.questions.is_empty()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// Questions of a category in display order; empty for unknown ids.
    pub fn questions_for(&self, id: CategoryId) -> &[Question] {
        self.by_category.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories paired with their questions, in category order.
    pub fn grouped(&self) -> impl Iterator<Item = (&Category, &[Question])> {
        self.categories
            .iter()
            .map(move |category| (category, self.questions_for(category.id)))
    }
}
