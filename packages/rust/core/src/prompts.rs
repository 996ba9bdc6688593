//! Prompt templates for wiki pages.

// ---------------------------------------------------------------------------
// Overview & Architecture
// ---------------------------------------------------------------------------

pub const PROJECT_OVERVIEW: &str = "\
Based on the codebase knowledge graph, provide a comprehensive overview of this project.

Include:
- What the project does (main purpose)
- Key features and capabilities
- Primary use cases
- Target audience (who would use this)
- High-level architecture approach

Be concise but comprehensive (2-3 paragraphs). Focus on what makes this project unique.";

pub const ARCHITECTURE: &str = "\
Analyze the codebase architecture and describe:

1. Overall Architecture Pattern
   - What architectural pattern is used? (MVC, microservices, layered, etc.)
   - Why was this pattern chosen?

2. Core Components
   - What are the main modules/packages?
   - How do they interact?

3. Data Flow
   - How does data flow through the system?
   - What are the main entry points?

Provide a clear, structured explanation suitable for developers.";

pub const DESIGN_DECISIONS: &str = "\
Explain the core concepts and design principles of this codebase.

Identify:
- Key abstractions and what they represent
- Important design patterns used (if any)
- Domain-specific terminology
- Mental models developers should understand

This should help developers understand the \"philosophy\" of the codebase.";

// ---------------------------------------------------------------------------
// Getting Started
// ---------------------------------------------------------------------------

pub const INSTALLATION: &str = "\
Create a \"Getting Started\" guide based on the codebase.

Include:
1. Installation
   - Prerequisites (languages, tools, versions)
   - Installation steps
   - Environment setup

2. Basic Usage
   - Simplest way to use the project
   - First example
   - Expected output

3. Configuration
   - Required configuration
   - Common settings

Be practical and actionable for someone new to the project.";

pub const CONFIGURATION: &str = "\
Document configuration options:

1. Main Configuration
   - Configuration file format
   - Key settings and their purpose
   - Default values

2. Environment Variables
   - Available environment variables
   - How they override config

3. Advanced Configuration
   - Performance tuning options
   - Custom settings

Format as reference guide with examples.";

// ---------------------------------------------------------------------------
// Core Concepts
// ---------------------------------------------------------------------------

pub const KEY_COMPONENTS: &str = "\
Identify and describe the 5-10 most important components/modules in this codebase.

For each key component, provide:
- Component name
- Primary responsibility (one sentence)
- Key classes/functions within it
- What it depends on

Organize by importance and functionality.";

pub const PROJECT_STRUCTURE: &str = "\
Explain the directory/package structure of this codebase.

For the main directories:
- Directory name
- Purpose
- What types of files belong there

This helps developers navigate the codebase.";

pub const COMMON_WORKFLOWS: &str = "\
Describe 2-3 common workflows or processes in this codebase.

For each workflow:
- Workflow name
- Step-by-step process
- Components involved

Focus on workflows that represent core functionality.";

// ---------------------------------------------------------------------------
// API Reference
// ---------------------------------------------------------------------------

pub const PUBLIC_API: &str = "\
Extract and document the main public APIs of this codebase.

For each major API/interface:
- API name and purpose
- Main methods/functions
- Parameters and return types
- Brief usage example

Focus on APIs that external users would interact with.
Organize by functionality (e.g., Authentication API, Data API, etc.)";

pub const CODE_EXAMPLES: &str = "\
Provide 3-5 practical code examples showing how to use this codebase.

For each example:
- Clear title explaining the use case
- Actual code snippet
- Brief explanation of what it does

Focus on common, real-world scenarios.";

// ---------------------------------------------------------------------------
// Development Guide
// ---------------------------------------------------------------------------

pub const DEPENDENCIES: &str = "\
Analyze the dependencies of this codebase.

List:
1. External Dependencies
   - Major libraries/packages used
   - Purpose of each major dependency

2. System Requirements
   - Platform requirements (OS, runtime)
   - Minimum versions if critical

Be concise but cover the most important dependencies.";

pub const TESTING: &str = "\
Describe the testing approach in this codebase.

Cover:
- Types of tests (unit, integration, e2e)
- Testing frameworks used
- How to run tests
- How to write new tests

Be practical and actionable.";

pub const EXTENSION_POINTS: &str = "\
Describe how this codebase can be extended or customized.

Include:
- Plugin/extension mechanisms (if any)
- Customization points
- How to add new features
- Best practices for extending

This helps developers who want to build on the codebase.";

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

pub const MODULE_INDEX: &str = "\
Create a comprehensive Module Index for this codebase:

1. **Module Overview**
   High-level description of how modules are organized

2. **Module Hierarchy**
   Show parent-child relationships as an ASCII tree, grouped by layer
   (core logic, storage, integrations, interfaces)

3. **Module Quick Reference**
   Table with: Module, Purpose, Dependencies, Complexity

4. **Navigation**
   Links to each module's detailed documentation

Format as module map with ASCII tree.";

pub const ENTRY_POINTS: &str = "\
Document the main entry points of this codebase:

1. **Purpose**: What each entry point (binary, CLI command, server, public function) starts
2. **Startup Sequence**: What gets initialized and in what order
3. **Configuration**: Parameters and settings read at startup
4. **Usage Examples**: How each entry point is invoked

Format as comprehensive module documentation.";

pub const CORE_ABSTRACTIONS: &str = "\
Document the central abstractions of this codebase:

1. **Purpose**: The core types, classes, or interfaces everything else builds on
2. **Key Members**: Important fields, methods, and functions for each
3. **Relationships**: How the abstractions depend on and compose with each other
4. **Implementation Guide**: How to add a new implementation of an interface
5. **Examples**: Code snippets for typical use

Format as API documentation with interface definitions.";

pub const EXTERNAL_SERVICES: &str = "\
Document how this codebase integrates with external services and libraries:

1. **Integrations**: Each external service, API, or major library it talks to
2. **Boundaries**: The modules that own each integration
3. **Configuration**: Credentials, endpoints, and options each integration needs
4. **Failure Handling**: What happens when an integration is unavailable

Format as integration reference.";

pub const PERSISTENCE: &str = "\
Document how this codebase stores and loads data:

1. **Storage Backends**: Files, databases, caches, or remote stores in use
2. **Data Formats**: Schemas, serialization formats, and layout on disk
3. **Access Patterns**: Which modules read and write which data
4. **Lifecycle**: Creation, migration, and cleanup of stored data

Format as storage reference with examples.";

/// Default index prompt for a category without an explicit one.
pub fn category_index_prompt(category_title: &str) -> String {
    format!(
        "Create an index page for the \"{category_title}\" section:

1. **Section Overview**: What this section covers
2. **Table of Contents**: All pages with 1-line descriptions
3. **Quick Links**: Most important pages
4. **Learning Path**: Recommended reading order

Format as markdown."
    )
}
