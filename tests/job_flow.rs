use axio_common::adapters::persistence::{MemoryStore, SqliteRepo};
use axio_common::domain::messages::{CompleteRunRequest, UpdateJobProgressRequest};
use axio_common::domain::{
    Client, Device, DomainError, Job, JobStatus, MetricsReport, Registry, RunConfig,
};
use axio_common::ports::{ModelStore, ModelStoreExt};
use axio_common::usecases::{ClientService, DeviceService, JobService};
use serde_json::{json, Value};
use std::sync::Arc;

fn config() -> Value {
    json!({"DEVICE_ID": "07-00c4", "OUTPUT_TYPE": "force [N]", "EPOCHS": 10})
}

fn progress(job: &Job, run_number: i64) -> UpdateJobProgressRequest {
    UpdateJobProgressRequest {
        job_id: job.id.clone(),
        run_number,
        total_runs: 3,
        run_config: RunConfig {
            learning_rate: 0.001,
            activation: "relu".into(),
            optimizer_name: "adam".into(),
            layers: vec![64, 32],
            batch_size: 16,
            epochs: 10,
        },
        hostname: "rig-01".into(),
    }
}

fn finished(job: &Job, run_number: i64, last_mae: f64) -> CompleteRunRequest {
    CompleteRunRequest {
        job_id: job.id.clone(),
        run_number,
        train_metrics: MetricsReport::new().with("TE-all", "mae", vec![0.1, 0.1, 0.1]),
        val_metrics: MetricsReport::new().with("TE-all", "mae", vec![0.2, 0.2, 0.2]),
        test_metrics: MetricsReport::new().with("TE-all", "mae", vec![9.0, 9.0, last_mae]),
        epochs_completed: 10,
        hostname: "rig-01".into(),
    }
}

async fn queue_job(store: &Arc<dyn ModelStore>) -> Job {
    let device = DeviceService::new(Arc::clone(store))
        .resolve_device(&config())
        .await
        .unwrap();
    let job = Job::new(&device.axf_id, &config(), 1_700_000_000).unwrap();
    store.insert(&job).await.unwrap();
    job
}

async fn best_run_is_elected(store: Arc<dyn ModelStore>) {
    let jobs = JobService::new(Arc::clone(&store));
    let job = queue_job(&store).await;

    let assigned = jobs
        .update_job_status(&job.id, "assigned", Some("rig-01"))
        .await
        .unwrap();
    assert_eq!(assigned.status, JobStatus::Assigned);
    assert!(assigned.last_heartbeat.is_some());

    for (number, mae) in [(1, 0.5), (2, 0.8), (3, 0.2)] {
        let run = jobs.update_progress(&progress(&job, number)).await.unwrap();
        assert!(run.is_current);
        let done = jobs
            .complete_run(&finished(&job, number, mae))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.number, number);
        assert!(!done.is_current);
    }

    let runs = jobs.runs_for_job(&job.id).await.unwrap();
    assert_eq!(runs.len(), 3);
    let best: Vec<i64> = runs.iter().filter(|r| r.is_best).map(|r| r.number).collect();
    assert_eq!(best, vec![3]);
    assert!(runs.iter().all(|r| !r.is_current));

    let stored = jobs.get_job_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    assert_eq!(stored.run_number, 3);
    assert_eq!(stored.total_runs, 3);
    assert!(stored.started_at.is_some());

    let device: Device = store.get("07.00c4").await.unwrap().unwrap();
    assert_eq!(device.best_force_run, Some(3));
    assert_eq!(device.best_force_timestamp, Some(1_700_000_000));
    assert!(device.best_moment_run.is_none());

    let completed = jobs.complete(&job.id).await.unwrap();
    assert!(completed.completed_at.is_some());
    assert!(completed.duration >= 0.0);
}

async fn interruption_releases_client(store: Arc<dyn ModelStore>) {
    let clients = ClientService::new(Arc::clone(&store));
    let jobs = JobService::new(Arc::clone(&store));

    let mut client = clients
        .register_client("10.0.0.4", Some("rig-01"), true)
        .await
        .unwrap()
        .unwrap();
    client.update_job_tracking(true, 0.0);
    store.save(&mut client).await.unwrap();

    let job = queue_job(&store).await;
    jobs.update_job_status(&job.id, "assigned", Some("rig-01"))
        .await
        .unwrap();
    let beat = jobs.heartbeat(&job.id).await.unwrap();
    assert!(beat.last_heartbeat.is_some());

    let interrupted = jobs
        .update_job_status(&job.id, JobStatus::Interrupted, None)
        .await
        .unwrap();
    assert!(interrupted.interrupted_at.is_some());
    assert_eq!(interrupted.hostname.as_deref(), Some("rig-01"));

    let released: Client = store.get(&client.id).await.unwrap().unwrap();
    assert_eq!(released.active_jobs, 0);

    let err = jobs
        .update_job_status("no-such-job", "running", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { entity: "Job", .. }));
}

async fn completing_without_current_run(store: Arc<dyn ModelStore>) {
    let jobs = JobService::new(Arc::clone(&store));
    let job = queue_job(&store).await;
    assert!(jobs.complete_run(&finished(&job, 1, 0.1)).await.unwrap().is_none());
}

fn memory() -> Arc<dyn ModelStore> {
    Arc::new(MemoryStore::new(Registry::with_models().unwrap()))
}

async fn sqlite(dir: &tempfile::TempDir) -> Arc<dyn ModelStore> {
    let repo = SqliteRepo::connect(dir.path().join("axio.db"), Registry::with_models().unwrap())
        .await
        .unwrap();
    repo.create_all().await.unwrap();
    Arc::new(repo)
}

#[tokio::test]
async fn best_run_in_memory() {
    best_run_is_elected(memory()).await;
}

#[tokio::test]
async fn best_run_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    best_run_is_elected(sqlite(&dir).await).await;
}

#[tokio::test]
async fn interruption_in_memory() {
    interruption_releases_client(memory()).await;
}

#[tokio::test]
async fn interruption_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    interruption_releases_client(sqlite(&dir).await).await;
}

#[tokio::test]
async fn no_current_run_in_memory() {
    completing_without_current_run(memory()).await;
}

#[tokio::test]
async fn no_current_run_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    completing_without_current_run(sqlite(&dir).await).await;
}
