use axio_common::adapters::persistence::SqliteRepo;
use axio_common::domain::{
    Client, Device, DomainError, Entity, Job, MetricsReport, Registry, Run, RunConfig,
};
use axio_common::ports::{Filter, ModelStore, ModelStoreExt};
use serde_json::json;

async fn open(dir: &tempfile::TempDir) -> SqliteRepo {
    let repo = SqliteRepo::connect(dir.path().join("db").join("axio.db"), Registry::with_models().unwrap())
        .await
        .unwrap();
    repo.create_all().await.unwrap();
    repo
}

fn job_for(device: &Device) -> Job {
    Job::new(
        &device.axf_id,
        &json!({"DEVICE_ID": "07-00c4", "OUTPUT_TYPE": "moment [Nm]", "EPOCHS": 5}),
        1_700_000_000,
    )
    .unwrap()
}

#[tokio::test]
async fn entities_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir).await;

    let mut device = Device::new("07.00c4");
    device.best_force_run = Some(2);
    device.best_force_test_metrics =
        Some(MetricsReport::new().with("TE-all", "mae", vec![0.5, 0.25, 0.125]));
    repo.insert(&device).await.unwrap();

    let mut client = Client::new(Some("rig-01"), "10.0.0.4", false);
    client.total_duration = 12.75;
    repo.insert(&client).await.unwrap();

    let mut job = job_for(&device);
    job.update_status("assigned", Some("rig-01"));
    repo.insert(&job).await.unwrap();

    let mut run = job.start_run(
        &RunConfig {
            learning_rate: 0.001,
            activation: "relu".into(),
            optimizer_name: "adam".into(),
            layers: vec![64, 32, 3],
            batch_size: 16,
            epochs: 5,
        },
        1,
    );
    run.complete(
        5,
        MetricsReport::new(),
        MetricsReport::new(),
        MetricsReport::new().with("TE-all", "mae", vec![1.5]),
    );
    repo.insert(&run).await.unwrap();

    assert_eq!(repo.get::<Device>(&device.axf_id).await.unwrap(), Some(device));
    assert_eq!(repo.get::<Client>(&client.id).await.unwrap(), Some(client));
    assert_eq!(repo.get::<Job>(&job.id).await.unwrap(), Some(job));
    assert_eq!(repo.get::<Run>(&run.id).await.unwrap(), Some(run));
}

#[tokio::test]
async fn runs_with_non_finite_metrics_stay_readable() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir).await;

    let device = Device::new("07.00c4");
    repo.insert(&device).await.unwrap();
    let job = job_for(&device);
    repo.insert(&job).await.unwrap();

    let mut run = Run::new(&job.id, 1);
    run.complete(
        5,
        MetricsReport::new(),
        MetricsReport::new(),
        MetricsReport::new()
            .with("TE-all", "mape", vec![f64::INFINITY, 1.0, 2.0])
            .with("TE-all", "mae", vec![0.4, 0.3, f64::NAN]),
    );
    repo.insert(&run).await.unwrap();

    let loaded = repo.get::<Run>(&run.id).await.unwrap().unwrap();
    assert_eq!(loaded, run);
    assert_eq!(loaded.best_metric(), None);

    let runs: Vec<Run> = repo
        .find_all(&Filter::new().where_eq("job_id", job.id.as_str()))
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(
        runs[0].test_metrics.as_ref().unwrap().0["TE-all"]["mape"],
        vec![None, Some(1.0), Some(2.0)]
    );
}

#[tokio::test]
async fn save_updates_row_and_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir).await;

    let mut client = Client::new(Some("rig-01"), "10.0.0.4", true);
    repo.insert(&client).await.unwrap();
    let created = client.updated_at;

    client.update_job_tracking(true, 0.0);
    client.mark_inactive();
    repo.save(&mut client).await.unwrap();

    let loaded: Client = repo.get(&client.id).await.unwrap().unwrap();
    assert_eq!(loaded.active_jobs, 1);
    assert_eq!(loaded.status.as_str(), "inactive");
    assert!(loaded.updated_at >= created);
    assert_eq!(loaded.created_at, client.created_at);
}

#[tokio::test]
async fn filters_by_column_values() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir).await;

    for (host, daemon) in [("a", true), ("b", false), ("c", true)] {
        repo.insert(&Client::new(Some(host), "10.0.0.1", daemon))
            .await
            .unwrap();
    }
    repo.insert(&Client::new(None, "10.0.0.9", true)).await.unwrap();

    let daemons: Vec<Client> = repo
        .find_all(&Filter::new().where_eq("daemon", true))
        .await
        .unwrap();
    let names: Vec<_> = daemons.iter().filter_map(|c| c.hostname.clone()).collect();
    assert_eq!(names, vec!["a", "c"]);

    let unnamed: Vec<Client> = repo
        .find_all(&Filter::new().where_eq("hostname", serde_json::Value::Null))
        .await
        .unwrap();
    assert_eq!(unnamed.len(), 1);

    let mut timed = Client::new(Some("d"), "10.0.0.2", false);
    timed.total_duration = 12.0;
    repo.insert(&timed).await.unwrap();
    let by_duration: Vec<Client> = repo
        .find_all(&Filter::new().where_eq("total_duration", 12))
        .await
        .unwrap();
    assert_eq!(by_duration.len(), 1);
    assert_eq!(by_duration[0].id, timed.id);

    let limited = repo
        .find_records(Client::TABLE, &Filter::new(), Some(2))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    let err = repo
        .find_records(Client::TABLE, &Filter::new().where_eq("colour", "red"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Schema(_)));
}

#[tokio::test]
async fn store_errors_propagate() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir).await;

    let device = Device::new("07.00c4");
    repo.insert(&device).await.unwrap();
    let err = repo.insert(&device).await.unwrap_err();
    assert!(matches!(err, DomainError::Store(_)));

    let orphan = job_for(&Device::new("08.ffff"));
    let err = repo.insert(&orphan).await.unwrap_err();
    assert!(matches!(err, DomainError::Store(_)));

    let mut ghost = Client::new(Some("ghost"), "10.0.0.1", true);
    let err = repo.save(&mut ghost).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { entity: "Client", .. }));

    let err = repo
        .insert_record("widgets", &serde_json::Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Schema(_)));
}

#[tokio::test]
async fn create_all_is_idempotent_and_delete_removes() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir).await;
    repo.create_all().await.unwrap();
    assert_eq!(repo.table_names(), vec!["devices", "clients", "jobs", "runs"]);

    let client = Client::new(Some("rig-01"), "10.0.0.4", true);
    repo.insert(&client).await.unwrap();
    assert!(repo.delete::<Client>(&client.id).await.unwrap());
    assert!(!repo.delete::<Client>(&client.id).await.unwrap());

    // Reopening sees the same file.
    let device = Device::new("05.0001");
    repo.insert(&device).await.unwrap();
    drop(repo);
    let reopened = open(&dir).await;
    assert!(reopened.get::<Device>("05.0001").await.unwrap().is_some());
}
