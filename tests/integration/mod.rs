//! Integration tests for the widgetforge pipeline

mod idea_proposal;
mod job_lifecycle;
mod orchestration;
mod specification_synthesis;
mod test_utils;
mod widget_fanout;
