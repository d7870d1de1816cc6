use std::thread;

use camino::Utf8PathBuf;
use chrono::FixedOffset;
use crossbeam_channel::{bounded, unbounded};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResolvedConfig;
use crate::domain::{
    Artifact, HarborVersion, Inventory, Project, Repository, TagInfo, strip_project_prefix,
};
use crate::error::ListerError;
use crate::harbor::{HarborClient, fetch_all_pages};
use crate::sheet::SheetWriter;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub concurrency: usize,
    pub page_size: u32,
    pub output: Utf8PathBuf,
    pub utc_offset: FixedOffset,
}

impl From<&ResolvedConfig> for RunOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            page_size: config.page_size,
            output: config.output.clone(),
            utc_offset: config.utc_offset,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SkipScope {
    Project,
    Repository,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedItem {
    pub scope: SkipScope,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub repositories: usize,
    pub artifacts: usize,
    pub tags: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Totals {
    pub projects: usize,
    pub repositories: usize,
    pub artifacts: usize,
    pub tags: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub harbor_version: String,
    pub output: String,
    pub projects: Vec<ProjectSummary>,
    pub empty_projects: Vec<String>,
    pub skipped: Vec<SkippedItem>,
    pub totals: Totals,
}

#[derive(Debug, Clone)]
pub struct Collected {
    pub inventory: Inventory,
    pub empty_projects: Vec<String>,
    pub skipped: Vec<SkippedItem>,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Connected { version: String },
    ProjectsDiscovered { total: usize },
    ProjectStarted { project: String },
    ProjectFinished { project: String, repositories: usize, tags: usize },
    ProjectEmpty { project: String },
    ProjectFailed { project: String, reason: String },
    Warning { message: String },
    Exported { path: String },
}

/// Receives progress from worker threads, hence `Sync`.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);

    /// Checked between projects and before the workbook is saved.
    fn is_cancelled(&self) -> bool {
        false
    }
}

struct ProjectOutcome {
    project: Option<Project>,
    name: String,
    skipped: Vec<SkippedItem>,
}

#[derive(Clone)]
pub struct App<H: HarborClient> {
    client: H,
}

impl<H: HarborClient> App<H> {
    pub fn new(client: H) -> Self {
        Self { client }
    }

    pub fn run(
        &self,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ListResult, ListerError> {
        let version = self.check_version(sink)?;
        let collected = self.collect(version, options, sink)?;
        if sink.is_cancelled() {
            return Err(ListerError::Aborted);
        }
        self.export(&collected.inventory, options)?;
        sink.event(ProgressEvent::Exported {
            path: options.output.to_string(),
        });
        info!(path = %options.output, "workbook saved");
        Ok(summarize(collected, options))
    }

    /// Returns the raw version string reported by the server once it passes the 2.x gate.
    pub fn check_version(&self, sink: &dyn ProgressSink) -> Result<String, ListerError> {
        let info = self.client.system_info()?;
        let version: HarborVersion = info.harbor_version.parse()?;
        if !version.supports_api_v2() {
            return Err(ListerError::UnsupportedVersion(info.harbor_version));
        }
        info!(version = %info.harbor_version, "connected to Harbor");
        sink.event(ProgressEvent::Connected {
            version: info.harbor_version.clone(),
        });
        Ok(info.harbor_version)
    }

    pub fn collect(
        &self,
        harbor_version: String,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Collected, ListerError> {
        let names: Vec<String> = fetch_all_pages(options.page_size, |page| {
            self.client.list_projects(page, options.page_size)
        })?
        .into_iter()
        .map(|record| record.name)
        .collect();

        info!(count = names.len(), "projects discovered");
        sink.event(ProgressEvent::ProjectsDiscovered { total: names.len() });

        let outcomes = self.fan_out(names, options, sink)?;

        let mut inventory = Inventory {
            harbor_version,
            projects: Vec::new(),
        };
        let mut empty_projects = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            skipped.extend(outcome.skipped);
            match outcome.project {
                Some(project) if !project.is_empty() => inventory.projects.push(project),
                Some(_) => empty_projects.push(outcome.name),
                None => {}
            }
        }
        inventory.sort();
        empty_projects.sort();
        skipped.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Collected {
            inventory,
            empty_projects,
            skipped,
        })
    }

    pub fn export(&self, inventory: &Inventory, options: &RunOptions) -> Result<(), ListerError> {
        SheetWriter::new(options.utc_offset).save(inventory, &options.output)
    }

    fn fan_out(
        &self,
        names: Vec<String>,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<ProjectOutcome>, ListerError> {
        let workers = options.concurrency.max(1).min(names.len().max(1));
        let (job_tx, job_rx) = bounded::<String>(workers);
        let (result_tx, result_rx) = unbounded::<ProjectOutcome>();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                handles.push(scope.spawn(move || {
                    for name in job_rx.iter() {
                        if sink.is_cancelled() {
                            break;
                        }
                        let outcome = self.collect_project(name, options, sink);
                        if result_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                }));
            }
            drop(job_rx);
            drop(result_tx);

            for name in names {
                if job_tx.send(name).is_err() {
                    break;
                }
            }
            drop(job_tx);

            let outcomes: Vec<ProjectOutcome> = result_rx.iter().collect();
            for handle in handles {
                handle
                    .join()
                    .map_err(|_| ListerError::Worker("project worker panicked".to_string()))?;
            }
            Ok(outcomes)
        })
    }

    fn collect_project(
        &self,
        name: String,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> ProjectOutcome {
        sink.event(ProgressEvent::ProjectStarted {
            project: name.clone(),
        });
        debug!(project = %name, "listing repositories");

        let mut skipped = Vec::new();
        let records = match fetch_all_pages(options.page_size, |page| {
            self.client.list_repositories(&name, page, options.page_size)
        }) {
            Ok(records) => records,
            Err(err) => {
                warn!(project = %name, error = %err, "skipping project");
                sink.event(ProgressEvent::ProjectFailed {
                    project: name.clone(),
                    reason: err.to_string(),
                });
                skipped.push(SkippedItem {
                    scope: SkipScope::Project,
                    name: name.clone(),
                    reason: err.to_string(),
                });
                return ProjectOutcome {
                    project: None,
                    name,
                    skipped,
                };
            }
        };

        let mut project = Project::new(name.clone());
        for record in records {
            let repo_name = strip_project_prefix(&name, &record.name).to_string();
            let artifacts = match fetch_all_pages(options.page_size, |page| {
                self.client
                    .list_artifacts(&name, &repo_name, page, options.page_size)
            }) {
                Ok(artifacts) => artifacts,
                Err(err) => {
                    warn!(project = %name, repository = %repo_name, error = %err, "skipping repository");
                    sink.event(ProgressEvent::Warning {
                        message: format!(
                            "listing artifacts of repository '{name}/{repo_name}' failed: {err}"
                        ),
                    });
                    skipped.push(SkippedItem {
                        scope: SkipScope::Repository,
                        name: format!("{name}/{repo_name}"),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let mut repository = Repository::new(repo_name);
            for record in artifacts {
                repository.add_artifact(Artifact {
                    digest: record.digest,
                    tags: record
                        .tags
                        .into_iter()
                        .map(|tag| TagInfo {
                            name: tag.name,
                            push_time: tag.push_time,
                        })
                        .collect(),
                });
            }
            project.add_repository(repository);
        }

        if project.is_empty() {
            info!(project = %name, "project has no tagged repositories");
            sink.event(ProgressEvent::ProjectEmpty {
                project: name.clone(),
            });
        } else {
            info!(
                project = %name,
                repositories = project.repositories.len(),
                tags = project.tag_count(),
                "project done"
            );
            sink.event(ProgressEvent::ProjectFinished {
                project: name.clone(),
                repositories: project.repositories.len(),
                tags: project.tag_count(),
            });
        }

        ProjectOutcome {
            project: Some(project),
            name,
            skipped,
        }
    }
}

fn summarize(collected: Collected, options: &RunOptions) -> ListResult {
    let projects: Vec<ProjectSummary> = collected
        .inventory
        .projects
        .iter()
        .map(|project| ProjectSummary {
            name: project.name.clone(),
            repositories: project.repositories.len(),
            artifacts: project.artifact_count(),
            tags: project.tag_count(),
        })
        .collect();

    let totals = Totals {
        projects: projects.len(),
        repositories: projects.iter().map(|p| p.repositories).sum(),
        artifacts: projects.iter().map(|p| p.artifacts).sum(),
        tags: projects.iter().map(|p| p.tags).sum(),
    };

    ListResult {
        harbor_version: collected.inventory.harbor_version,
        output: options.output.to_string(),
        projects,
        empty_projects: collected.empty_projects,
        skipped: collected.skipped,
        totals,
    }
}
