//! Default collaborator implementations.

pub mod file_chunker;
pub mod knowledge_store;
pub mod loop_detector;
pub mod memory_subject;
pub mod scenario;

pub use file_chunker::FileContextChunker;
pub use knowledge_store::InMemoryKnowledgeStore;
pub use loop_detector::{ThresholdLoopDetector, WhenExhausted};
pub use memory_subject::InMemorySubject;
pub use scenario::{
    EvidenceScript, FixScript, LoopScript, MethodologyScript, Scenario, ScriptedFixApplier,
    ScriptedMethodology, ScriptedPass, ScriptedVerifier, SubjectScript,
};
