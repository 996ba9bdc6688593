//! Declarative wiki structure.
//!
//! A fixed, ordered tree of categories, nested folders and page definitions.
//! [`wiki_structure`] is pure: the same flag always yields an equal tree.

use repowiki_shared::QueryMode;

use crate::prompts;

/// One query against the knowledge engine and one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDefinition {
    /// File stem, unique within its category.
    pub name: String,
    pub title: String,
    pub mode: QueryMode,
    /// Result fan-in size passed as `top_k`.
    pub breadth: u32,
    pub prompt: String,
}

/// A child of a category: a page or a nested folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Page(PageDefinition),
    Folder(Category),
}

/// A category (or nested folder) of the wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Directory name under the output root (or the parent category).
    pub id: String,
    pub title: String,
    /// Explicit prompt for the category's `README.md`.
    pub index_prompt: Option<String>,
    pub children: Vec<Node>,
}

impl Category {
    pub fn pages(&self) -> impl Iterator<Item = &PageDefinition> {
        self.children.iter().filter_map(|n| match n {
            Node::Page(p) => Some(p),
            Node::Folder(_) => None,
        })
    }

    pub fn folders(&self) -> impl Iterator<Item = &Category> {
        self.children.iter().filter_map(|n| match n {
            Node::Folder(f) => Some(f),
            Node::Page(_) => None,
        })
    }

    /// Pages in this category and every nested folder.
    pub fn page_count(&self) -> usize {
        self.pages().count() + self.folders().map(Category::page_count).sum::<usize>()
    }
}

/// The ordered set of top-level categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiStructure {
    pub categories: Vec<Category>,
}

impl WikiStructure {
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn page_count(&self) -> usize {
        self.categories.iter().map(Category::page_count).sum()
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn page(name: &str, title: &str, mode: QueryMode, breadth: u32, prompt: &str) -> Node {
    Node::Page(PageDefinition {
        name: name.into(),
        title: title.into(),
        mode,
        breadth,
        prompt: prompt.into(),
    })
}

fn category(id: &str, title: &str, children: Vec<Node>) -> Category {
    Category {
        id: id.into(),
        title: title.into(),
        index_prompt: None,
        children,
    }
}

fn folder(id: &str, title: &str, children: Vec<Node>) -> Node {
    Node::Folder(category(id, title, children))
}

/// The wiki's category tree. `extended` appends the optional categories
/// after the base ones without altering them.
pub fn wiki_structure(extended: bool) -> WikiStructure {
    use QueryMode::{Global, Hybrid, Local};

    let mut categories = vec![category(
        "01-overview",
        "Overview & Architecture",
        vec![
            page("project-overview", "Project Overview", Global, 30, prompts::PROJECT_OVERVIEW),
            page("architecture", "Architecture", Global, 30, prompts::ARCHITECTURE),
            page("design-decisions", "Design Decisions", Global, 30, prompts::DESIGN_DECISIONS),
        ],
    )];

    if !extended {
        return WikiStructure { categories };
    }

    categories.extend([
        category(
            "02-getting-started",
            "Getting Started",
            vec![
                page("installation", "Getting Started", Hybrid, 35, prompts::INSTALLATION),
                page("configuration", "Configuration Guide", Hybrid, 35, prompts::CONFIGURATION),
            ],
        ),
        category(
            "03-core-concepts",
            "Core Concepts",
            vec![
                page("key-components", "Key Components", Local, 40, prompts::KEY_COMPONENTS),
                page(
                    "project-structure",
                    "Project Structure",
                    Hybrid,
                    35,
                    prompts::PROJECT_STRUCTURE,
                ),
                page("common-workflows", "Common Workflows", Global, 30, prompts::COMMON_WORKFLOWS),
            ],
        ),
        category(
            "04-api-reference",
            "API Reference",
            vec![
                page("public-api", "Public API", Local, 40, prompts::PUBLIC_API),
                page("code-examples", "Code Examples", Local, 40, prompts::CODE_EXAMPLES),
            ],
        ),
        category(
            "05-development",
            "Development Guide",
            vec![
                page("dependencies", "Dependencies", Hybrid, 35, prompts::DEPENDENCIES),
                page("testing", "Testing Guide", Hybrid, 35, prompts::TESTING),
                page("extension-points", "Extension Points", Hybrid, 35, prompts::EXTENSION_POINTS),
            ],
        ),
        Category {
            index_prompt: Some(prompts::MODULE_INDEX.into()),
            ..category(
                "06-modules",
                "Modules",
                vec![
                    folder(
                        "core",
                        "Core",
                        vec![
                            page("entry-points", "Entry Points", Local, 80, prompts::ENTRY_POINTS),
                            page(
                                "core-abstractions",
                                "Core Abstractions",
                                Local,
                                60,
                                prompts::CORE_ABSTRACTIONS,
                            ),
                        ],
                    ),
                    folder(
                        "integrations",
                        "Integrations",
                        vec![
                            page(
                                "external-services",
                                "External Services",
                                Hybrid,
                                60,
                                prompts::EXTERNAL_SERVICES,
                            ),
                            page("persistence", "Persistence", Local, 60, prompts::PERSISTENCE),
                        ],
                    ),
                ],
            )
        },
    ]);

    WikiStructure { categories }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn all_pages<'a>(
        category: &'a Category,
        prefix: &str,
        out: &mut Vec<(String, &'a PageDefinition)>,
    ) {
        let path = if prefix.is_empty() {
            category.id.clone()
        } else {
            format!("{prefix}/{}", category.id)
        };
        for p in category.pages() {
            out.push((path.clone(), p));
        }
        for f in category.folders() {
            all_pages(f, &path, out);
        }
    }

    #[test]
    fn structure_is_pure() {
        assert_eq!(wiki_structure(false), wiki_structure(false));
        assert_eq!(wiki_structure(true), wiki_structure(true));
    }

    #[test]
    fn extended_is_strict_superset_with_identical_shared_categories() {
        let base = wiki_structure(false);
        let extended = wiki_structure(true);

        assert!(extended.categories.len() > base.categories.len());
        assert!(extended.page_count() > base.page_count());
        for category in &base.categories {
            assert_eq!(extended.category(&category.id), Some(category));
        }
        // Base categories keep their leading position.
        assert_eq!(
            extended.categories[..base.categories.len()],
            base.categories[..]
        );
    }

    #[test]
    fn page_paths_are_unique() {
        let structure = wiki_structure(true);
        let mut pages = Vec::new();
        for category in &structure.categories {
            all_pages(category, "", &mut pages);
        }

        let mut seen = HashSet::new();
        for (path, page) in &pages {
            assert!(
                seen.insert(format!("{path}/{}", page.name)),
                "duplicate page {path}/{}",
                page.name
            );
            assert!(page.breadth > 0);
            assert!(!page.prompt.trim().is_empty());
        }
        assert_eq!(pages.len(), structure.page_count());
    }

    #[test]
    fn modules_category_has_index_prompt_and_folders() {
        let structure = wiki_structure(true);
        let modules = structure.category("06-modules").unwrap();
        assert!(modules.index_prompt.is_some());
        assert_eq!(modules.pages().count(), 0);
        let folders: Vec<&str> = modules.folders().map(|f| f.id.as_str()).collect();
        assert_eq!(folders, vec!["core", "integrations"]);
    }
}
