use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::task::{RetryPolicy, Task, TaskId, TaskInputs, TaskResult};

/// Acumula tareas y aristas; `build()` devuelve un grafo validado e inmutable.
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una tarea. Sus dependencias tienen que estar ya registradas.
    pub fn add_task<F>(
        &mut self,
        id: impl Into<TaskId>,
        work: F,
        depends_on: &[&str],
        retry: RetryPolicy,
    ) -> Result<&mut Self, GraphError>
    where
        F: Fn(&TaskInputs) -> anyhow::Result<TaskResult> + Send + Sync + 'static,
    {
        let mut task = Task::new(id, work);
        task.retry = retry;
        for dep in depends_on {
            if !task.depends_on.iter().any(|d| d == dep) {
                task.depends_on.push((*dep).to_string());
            }
        }
        self.insert(task)?;
        Ok(self)
    }

    /// Igual que `add_task` pero con una `Task` ya armada.
    pub fn insert(&mut self, task: Task) -> Result<&mut Self, GraphError> {
        if self.index.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }
        for dep in &task.depends_on {
            if !self.index.contains_key(dep) {
                return Err(GraphError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(self)
    }

    /// Declara una arista extra `task` -> depende de -> `dependency` entre dos
    /// tareas ya registradas. Aristas repetidas se ignoran.
    pub fn add_dependency(&mut self, task: &str, dependency: &str) -> Result<&mut Self, GraphError> {
        let pos = match (self.index.get(task), self.index.contains_key(dependency)) {
            (Some(&pos), true) => pos,
            _ => {
                return Err(GraphError::UnknownDependency {
                    task: task.to_string(),
                    dependency: dependency.to_string(),
                })
            }
        };
        let deps = &mut self.tasks[pos].depends_on;
        if !deps.iter().any(|d| d == dependency) {
            deps.push(dependency.to_string());
        }
        Ok(self)
    }

    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let graph = TaskGraph {
            tasks: self.tasks,
            index: self.index,
        };
        graph.validate()?;
        Ok(graph)
    }
}

/// Grafo acíclico de tareas. No hace I/O ni guarda estado de runs.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tareas en orden de registro.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Sucesores directos de `id`, en orden de registro.
    pub fn dependents(&self, id: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.depends_on.iter().any(|d| d == id))
            .collect()
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.topological_order().map(|_| ())
    }

    /// Orden topológico (Kahn). Empates resueltos por orden de registro.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let mut in_degree: Vec<usize> = self.tasks.iter().map(|t| t.depends_on.len()).collect();

        // sucesores por posición
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];
        for (pos, task) in self.tasks.iter().enumerate() {
            for dep in &task.depends_on {
                if let Some(&d) = self.index.get(dep) {
                    successors[d].push(pos);
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..self.tasks.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(pos) = queue.pop_front() {
            order.push(self.tasks[pos].id.clone());
            let mut freed = Vec::new();
            for &succ in &successors[pos] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    freed.push(succ);
                }
            }
            freed.sort_unstable();
            queue.extend(freed);
        }

        if order.len() != self.tasks.len() {
            let stuck = self
                .tasks
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, t)| t.id.clone())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Tareas que todavía no están en `completed` y cuyas dependencias sí lo
    /// están, en orden de registro.
    pub fn ready_tasks(&self, completed: &HashSet<TaskId>) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| !completed.contains(&t.id))
            .filter(|t| t.depends_on.iter().all(|d| completed.contains(d)))
            .collect()
    }
}
