#![allow(dead_code)]

use chrono::{DateTime, Utc};
use taskwarden::task::Task;
use taskwarden::types::{Priority, TaskStatus};

/// Builder for `Task` to simplify test setup.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// Task named after its id.
    pub fn new(id: &str) -> Self {
        Self {
            task: Task::new(id, id),
        }
    }

    pub fn named(id: &str, name: &str) -> Self {
        Self {
            task: Task::new(id, name),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.task.description = text.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.task.add_label(label);
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        for l in labels {
            self.task.add_label(*l);
        }
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.add_dependency(dep);
        self
    }

    pub fn depends_on_all(mut self, deps: &[&str]) -> Self {
        for d in deps {
            self.task.add_dependency(d);
        }
        self
    }

    pub fn estimated_hours(mut self, hours: f64) -> Self {
        self.task.estimated_hours = hours;
        self
    }

    /// In progress and assigned to `agent`.
    pub fn assigned_to(mut self, agent: &str) -> Self {
        self.task.assigned_to = Some(agent.to_string());
        self.task.status = TaskStatus::InProgress;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.created_at = at;
        self.task.updated_at = at;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Shorthand: task `id` depending on `deps`, named after its id.
pub fn task(id: &str, deps: &[&str]) -> Task {
    TaskBuilder::new(id).depends_on_all(deps).build()
}
