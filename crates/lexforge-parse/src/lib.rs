//! Text segmentation for the Lexforge pipeline
//!
//! Two independent segmenters share one reference extractor:
//! - [`StructuralParser`] turns raw document text into an ordered tree of
//!   addressable units (section / chapter / article / clause / sub-clause).
//! - [`InstructionSplitter`] turns a raw amendment submission into discrete
//!   instructions and groups them by the article they address.
//!
//! Neither segmenter ever fails on malformed input: the structural parser
//! degrades to a single whole-document unit, the splitter to a single
//! whole-submission instruction. Encoding normalization is the caller's
//! concern; both take `&str`.

pub mod instructions;
pub mod refs;
pub mod structure;

pub use instructions::{InstructionGroup, InstructionSplitter};
pub use refs::ReferenceExtractor;
pub use structure::{ParsedUnit, StructuralParser};
