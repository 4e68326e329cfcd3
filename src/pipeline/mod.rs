//! Pipeline stages for invoice retrieval and consolidation.
//!
//! Each submodule wraps exactly one external concern behind a trait, with a
//! real implementation alongside it. The run driver only sees the traits, so
//! every stage can be replaced by a fake in tests.
//!
//! ## Data Flow
//!
//! ```text
//! report ─┬─▶ report ──▶ identifiers ─┐
//!         │  (calamine)                ├─▶ fetch ──▶ merge
//!         └─▶ sheet ──▶ links ──▶ URLs ┘  (reqwest)  (lopdf)
//!            (soffice)  (line scan)
//! ```
//!
//! 1. [`report`]: read the first sheet and pick the identifier column
//! 2. [`sheet`]: convert the spreadsheet to flat ODS; runs in
//!    `spawn_blocking` because the converter is an external process
//! 3. [`links`]: scan the flat ODS for invoice links, in row order
//! 4. [`fetch`]: one HTTP GET per invoice; the only stage with network I/O
//! 5. [`merge`]: concatenate the retrieved PDFs into one document

pub mod fetch;
pub mod links;
pub mod merge;
pub mod report;
pub mod sheet;
