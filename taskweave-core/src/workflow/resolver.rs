//! Execution order for workflow steps
//!
//! Depth-first over the steps in declared order with three-color marking.
//! Dependencies naming a step that is not part of the workflow are skipped.
//! A dependency back into a step that is still being visited is a cycle.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::WorkflowStep;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Resolver<'a> {
    steps: HashMap<&'a str, &'a WorkflowStep>,
    marks: HashMap<&'a str, Mark>,
    stack: Vec<&'a str>,
    order: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn visit(&mut self, name: &'a str) -> Result<()> {
        match self.marks.get(name).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = self.stack.iter().position(|s| *s == name).unwrap_or(0);
                let mut path: Vec<String> =
                    self.stack[start..].iter().map(|s| s.to_string()).collect();
                path.push(name.to_string());
                warn!("Workflow dependency cycle: {}", path.join(" -> "));
                return Err(Error::DependencyCycle { path });
            }
            Mark::Unvisited => {}
        }

        self.marks.insert(name, Mark::InProgress);
        self.stack.push(name);

        let step = self.steps[name];
        for dep in &step.dependencies {
            if self.steps.contains_key(dep.as_str()) {
                self.visit(dep.as_str())?;
            } else {
                debug!("Step '{}' depends on unknown step '{}', ignoring", name, dep);
            }
        }

        self.stack.pop();
        self.marks.insert(name, Mark::Done);
        self.order.push(name.to_string());
        Ok(())
    }
}

/// Order `steps` so every step follows its declared, existing dependencies
pub fn resolve(steps: &[WorkflowStep]) -> Result<Vec<String>> {
    let mut by_name = HashMap::with_capacity(steps.len());
    for step in steps {
        if by_name.insert(step.name.as_str(), step).is_some() {
            return Err(Error::DuplicateStep(step.name.clone()));
        }
    }

    let mut resolver = Resolver {
        steps: by_name,
        marks: HashMap::with_capacity(steps.len()),
        stack: Vec::new(),
        order: Vec::with_capacity(steps.len()),
    };
    for step in steps {
        resolver.visit(step.name.as_str())?;
    }

    Ok(resolver.order)
}
