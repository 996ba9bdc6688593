//! Page generation.
//!
//! The registry tree is flattened into [`CategoryPlan`]s up front; each plan
//! then fans its queries out concurrently and only resolves once every
//! query has, successfully or not.

use futures_util::future::{join, join_all};
use tracing::{info, instrument, warn};

use repowiki_engine::KnowledgeEngine;
use repowiki_shared::{QueryMode, QueryRequest};

use crate::prompts::category_index_prompt;
use crate::registry::{Category, WikiStructure};

/// Retrieval mode for category index pages.
pub const INDEX_MODE: QueryMode = QueryMode::Mix;

/// Result breadth for category index pages.
pub const INDEX_BREADTH: u32 = 100;

/// File stem of a category index.
pub const INDEX_PAGE: &str = "README";

/// Wrap a template with its breadcrumb.
pub fn compose_prompt(breadcrumb: &str, template: &str) -> String {
    format!("BREADCRUMB: {breadcrumb}\n\n{template}\n\nInclude breadcrumb at the top.")
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// One query to run and where its result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    /// Category path, `/`-separated for nested folders.
    pub category_id: String,
    pub page_name: String,
    pub title: String,
    pub breadcrumb: String,
    pub request: QueryRequest,
}

impl PageJob {
    /// Output path relative to the wiki root.
    pub fn relative_path(&self) -> String {
        format!("{}/{}.md", self.category_id, self.page_name)
    }
}

/// Every query for one category or nested folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPlan {
    /// Category path, `/`-separated for nested folders.
    pub id: String,
    pub title: String,
    pub index: Option<PageJob>,
    pub pages: Vec<PageJob>,
}

impl CategoryPlan {
    pub fn job_count(&self) -> usize {
        self.pages.len() + usize::from(self.index.is_some())
    }
}

/// Flatten `structure` into plans, parents before their folders.
///
/// Top-level categories always get an index page, using the default prompt
/// when none is declared. Nested folders get one only when they declare a
/// prompt.
pub fn plan(structure: &WikiStructure) -> Vec<CategoryPlan> {
    let mut plans = Vec::new();
    for category in &structure.categories {
        plan_category(category, None, "Home", &mut plans);
    }
    plans
}

fn plan_category(
    category: &Category,
    parent_id: Option<&str>,
    parent_crumb: &str,
    out: &mut Vec<CategoryPlan>,
) {
    let id = match parent_id {
        Some(parent) => format!("{parent}/{}", category.id),
        None => category.id.clone(),
    };
    let crumb = format!("{parent_crumb} > {}", category.title);

    let index_prompt = match (&category.index_prompt, parent_id) {
        (Some(prompt), _) => Some(prompt.clone()),
        (None, None) => Some(category_index_prompt(&category.title)),
        (None, Some(_)) => None,
    };
    let index = index_prompt.map(|prompt| PageJob {
        category_id: id.clone(),
        page_name: INDEX_PAGE.into(),
        title: format!("{} - Index", category.title),
        request: QueryRequest {
            prompt: compose_prompt(&crumb, &prompt),
            mode: INDEX_MODE,
            breadth: INDEX_BREADTH,
        },
        breadcrumb: crumb.clone(),
    });

    let pages = category
        .pages()
        .map(|p| {
            let breadcrumb = format!("{crumb} > {}", p.title);
            PageJob {
                category_id: id.clone(),
                page_name: p.name.clone(),
                title: p.title.clone(),
                request: QueryRequest {
                    prompt: compose_prompt(&breadcrumb, &p.prompt),
                    mode: p.mode,
                    breadth: p.breadth,
                },
                breadcrumb,
            }
        })
        .collect();

    out.push(CategoryPlan {
        id: id.clone(),
        title: category.title.clone(),
        index,
        pages,
    });

    for f in category.folders() {
        plan_category(f, Some(&id), &crumb, out);
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// How one page query resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Generated(String),
    Failed { reason: String },
}

/// A page query and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPage {
    pub category_id: String,
    pub page_name: String,
    pub title: String,
    pub outcome: PageOutcome,
}

impl GeneratedPage {
    pub fn content(&self) -> Option<&str> {
        match &self.outcome {
            PageOutcome::Generated(text) => Some(text),
            PageOutcome::Failed { .. } => None,
        }
    }

    pub fn relative_path(&self) -> String {
        format!("{}/{}.md", self.category_id, self.page_name)
    }
}

/// Results for one plan, in plan order.
#[derive(Debug, Clone)]
pub struct CategoryResult {
    pub id: String,
    pub title: String,
    pub index: Option<GeneratedPage>,
    pub pages: Vec<GeneratedPage>,
}

impl CategoryResult {
    /// Index first, then pages.
    pub fn all(&self) -> impl Iterator<Item = &GeneratedPage> {
        self.index.iter().chain(self.pages.iter())
    }
}

/// Callback fired as each page query resolves.
pub trait PageProgress: Send + Sync {
    fn page_done(&self, page: &GeneratedPage);
}

/// Issue exactly one query for `job`. Errors and empty answers become
/// [`PageOutcome::Failed`].
pub async fn generate_page(engine: &dyn KnowledgeEngine, job: &PageJob) -> GeneratedPage {
    let outcome = match engine.query(&job.request).await {
        Ok(text) if !text.trim().is_empty() => PageOutcome::Generated(text),
        Ok(_) => {
            warn!(title = %job.title, "engine returned an empty answer");
            PageOutcome::Failed {
                reason: "empty response".into(),
            }
        }
        Err(e) => {
            warn!(title = %job.title, error = %e, "page generation failed");
            PageOutcome::Failed {
                reason: e.to_string(),
            }
        }
    };

    GeneratedPage {
        category_id: job.category_id.clone(),
        page_name: job.page_name.clone(),
        title: job.title.clone(),
        outcome,
    }
}

/// Run every query of one plan concurrently.
#[instrument(skip_all, fields(category = %plan.id, jobs = plan.job_count()))]
pub async fn generate_category(
    engine: &dyn KnowledgeEngine,
    plan: &CategoryPlan,
    progress: &dyn PageProgress,
) -> CategoryResult {
    let run = |job: &PageJob| {
        let job = job.clone();
        async move {
            let page = generate_page(engine, &job).await;
            progress.page_done(&page);
            page
        }
    };

    let index = async {
        match &plan.index {
            Some(job) => Some(run(job).await),
            None => None,
        }
    };
    let pages = join_all(plan.pages.iter().map(&run));
    let (index, pages) = join(index, pages).await;

    let generated = index
        .iter()
        .chain(pages.iter())
        .filter(|p| p.content().is_some())
        .count();
    info!(generated, total = plan.job_count(), "category complete");

    CategoryResult {
        id: plan.id.clone(),
        title: plan.title.clone(),
        index,
        pages,
    }
}

/// Run all plans concurrently. Results keep plan order.
pub async fn generate_all(
    engine: &dyn KnowledgeEngine,
    plans: &[CategoryPlan],
    progress: &dyn PageProgress,
) -> Vec<CategoryResult> {
    join_all(plans.iter().map(|p| generate_category(engine, p, progress))).await
}
