//! End-to-end runs through `TestFrameworkExecutor`.

use anyhow::anyhow;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use testhost::adapters::{AdapterContext, TestCaseAdapter};
use testhost::arguments::ParameterInfo;
use testhost::di::{instance_of, Dispose, Lifetime};
use testhost::host::{Host, HostBuilder, ALLOW_PARALLELIZATION_KEY};
use testhost::models::{
    DataRow, DelegateTestCase, ExecutionMessage, MessageLog, RunSummary, TestCase, TestClass,
    TestCollection, TestMethod,
};
use testhost::runner::{InProcessRuntime, TestFrameworkExecutor, UniqueIdOrderer};
use testhost::scope::ScopeLevel;
use testhost::Startup;

/// Counts instances and records who saw which one.
#[derive(Default)]
struct Registry {
    created: AtomicUsize,
    seen: Mutex<Vec<(String, usize)>>,
}

struct Fixture {
    id: usize,
}

struct Services {
    registry: Arc<Registry>,
    parallel: bool,
}

impl Startup for Services {
    fn configure_host(&self, builder: &mut HostBuilder) {
        let registry = self.registry.clone();
        builder
            .without_environment()
            .configuration()
            .add_in_memory([(ALLOW_PARALLELIZATION_KEY, self.parallel.to_string())]);
        builder.configure_services(move |services| {
            services.add_lifetime_scoped::<Fixture, _>(ScopeLevel::Class, move |_| {
                Ok(Arc::new(Fixture {
                    id: registry.created.fetch_add(1, Ordering::SeqCst),
                }))
            });
        });
    }
}

fn executor(log: &Arc<MessageLog>, startup: impl Startup + 'static) -> TestFrameworkExecutor {
    TestFrameworkExecutor::new(Arc::new(InProcessRuntime::new(log.clone())))
        .unwrap()
        .with_startup(Arc::new(startup))
}

fn recording_case(method: &Arc<TestMethod>, registry: &Arc<Registry>) -> Arc<dyn TestCase> {
    let registry = registry.clone();
    DelegateTestCase::new(method.clone(), move |ctx| {
        let registry = registry.clone();
        async move {
            let fixture = ctx.services.resolve::<Fixture>()?;
            registry.seen.lock().push((ctx.display_name, fixture.id));
            Ok(())
        }
    })
    .into_shared()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn class_owned_service_created_once_per_class() {
    let registry = Arc::new(Registry::default());
    let log = Arc::new(MessageLog::new());
    let executor = executor(
        &log,
        Services {
            registry: registry.clone(),
            parallel: true,
        },
    );

    let collection = TestCollection::new("integration");
    let mut cases = Vec::new();
    for class in ["Accounts", "Billing"] {
        let class = TestClass::new(class, collection.clone()).into_shared();
        for method in ["one", "two", "three"] {
            cases.push(recording_case(&TestMethod::new(class.clone(), method), &registry));
        }
    }

    let summary = executor.run(cases).await.unwrap();

    assert_eq!((summary.total, summary.failed, summary.skipped), (6, 0, 0));
    assert_eq!(registry.created.load(Ordering::SeqCst), 2);

    let seen = registry.seen.lock();
    let ids_for = |class: &str| -> Vec<usize> {
        seen.iter()
            .filter(|(name, _)| name.starts_with(class))
            .map(|(_, id)| *id)
            .collect()
    };
    let accounts = ids_for("Accounts.");
    let billing = ids_for("Billing.");
    assert_eq!(accounts.len(), 3);
    assert!(accounts.iter().all(|id| *id == accounts[0]));
    assert!(billing.iter().all(|id| *id == billing[0]));
    assert_ne!(accounts[0], billing[0]);
}

struct Database;

#[tokio::test]
async fn missing_constructor_arguments_reported_together() {
    let log = Arc::new(MessageLog::new());
    let executor = executor(
        &log,
        Services {
            registry: Arc::new(Registry::default()),
            parallel: true,
        },
    );

    let class = TestClass::new("Repository", TestCollection::new("c"))
        .with_constructor(vec![
            ParameterInfo::required::<Database>("primary"),
            ParameterInfo::with_default("retries", 5u32),
            ParameterInfo::optional::<String>("label"),
            ParameterInfo::required::<Database>("replica"),
        ])
        .into_shared();
    let case = DelegateTestCase::new(TestMethod::new(class, "saves"), |_| async { Ok(()) });

    let summary = executor.run(vec![case.into_shared()]).await.unwrap();

    assert_eq!((summary.total, summary.failed), (1, 1));
    let failures = log.failures();
    assert_eq!(failures.len(), 1);
    let ExecutionMessage::TestFailed { message, .. } = &failures[0] else {
        panic!("expected a failure, got {:?}", failures[0]);
    };
    assert!(message.contains("primary"));
    assert!(message.contains("replica"));
    assert!(!message.contains("retries"));
    assert!(!message.contains("label"));
}

#[tokio::test]
async fn default_and_optional_arguments_reach_the_body() {
    let log = Arc::new(MessageLog::new());
    let executor = executor(
        &log,
        Services {
            registry: Arc::new(Registry::default()),
            parallel: true,
        },
    );

    let class = TestClass::new("Retrying", TestCollection::new("c"))
        .with_constructor(vec![
            ParameterInfo::with_default("retries", 5u32),
            ParameterInfo::optional::<String>("label"),
        ])
        .into_shared();
    let case = DelegateTestCase::new(TestMethod::new(class, "retries"), |ctx| async move {
        let retries = ctx
            .constructor_arguments
            .named::<u32>("retries")
            .ok_or_else(|| anyhow!("no retries"))?;
        let label = ctx
            .constructor_arguments
            .named::<String>("label")
            .ok_or_else(|| anyhow!("no label"))?;
        anyhow::ensure!(*retries == 5, "retries was {}", retries);
        anyhow::ensure!(label.is_empty());
        Ok(())
    });

    let summary = executor.run(vec![case.into_shared()]).await.unwrap();
    assert_eq!((summary.total, summary.failed), (1, 0));
    assert!(log.failures().is_empty());
}

#[tokio::test]
async fn theory_rows_run_and_skip() {
    let log = Arc::new(MessageLog::new());
    let executor = executor(
        &log,
        Services {
            registry: Arc::new(Registry::default()),
            parallel: true,
        },
    );

    let class = TestClass::new("MathTests", TestCollection::new("c")).into_shared();
    let case = DelegateTestCase::new(TestMethod::new(class, "doubles"), |ctx| async move {
        let input = ctx.argument::<i32>(0).ok_or_else(|| anyhow!("no input"))?;
        let expected = ctx.argument::<i32>(1).ok_or_else(|| anyhow!("no expected"))?;
        anyhow::ensure!(*input * 2 == *expected, "{} * 2 != {}", input, expected);
        Ok(())
    })
    .with_data(|| -> anyhow::Result<Vec<DataRow>> {
        let row = |a: i32, b: i32| vec![instance_of(Arc::new(a)), instance_of(Arc::new(b))];
        Ok(vec![
            DataRow::new("1, 2", row(1, 2)),
            DataRow::new("2, 5", row(2, 5)),
            DataRow::new("0, 0", row(0, 0)).skip("trivial"),
        ])
    });

    let summary = executor.run(vec![case.into_shared()]).await.unwrap();

    assert_eq!((summary.total, summary.failed, summary.skipped), (3, 1, 1));
    assert_eq!(log.passed(), vec!["MathTests.doubles(1, 2)".to_string()]);
    assert!(log.failures()[0].to_string().contains("MathTests.doubles(2, 5)"));
}

/// Claims every case and runs none of them.
struct Quarantine {
    claimed: Arc<AtomicUsize>,
}

impl TestCaseAdapter for Quarantine {
    fn can_handle(&self, case: &dyn TestCase) -> bool {
        case.class().name == "Flaky"
    }

    fn run(
        &self,
        case: Arc<dyn TestCase>,
        context: AdapterContext,
    ) -> BoxFuture<'static, RunSummary> {
        self.claimed.fetch_add(1, Ordering::SeqCst);
        async move {
            context.bus.queue_message(ExecutionMessage::TestSkipped {
                test: case.display_name().to_string(),
                reason: "quarantined".into(),
            });
            RunSummary::skipped()
        }
        .boxed()
    }
}

struct Quarantined(Arc<AtomicUsize>);

impl Startup for Quarantined {
    fn configure_host(&self, builder: &mut HostBuilder) {
        builder.without_environment().add_adapter(Arc::new(Quarantine {
            claimed: self.0.clone(),
        }));
    }
}

#[tokio::test]
async fn adapter_registered_last_takes_over() {
    let claimed = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(MessageLog::new());
    let executor = executor(&log, Quarantined(claimed.clone()));

    let collection = TestCollection::new("c");
    let flaky = TestClass::new("Flaky", collection.clone()).into_shared();
    let stable = TestClass::new("Stable", collection).into_shared();
    let cases = vec![
        DelegateTestCase::new(TestMethod::new(flaky, "sometimes"), |_| async {
            Err(anyhow!("should not run"))
        })
        .into_shared(),
        DelegateTestCase::new(TestMethod::new(stable, "always"), |_| async { Ok(()) })
            .into_shared(),
    ];

    let summary = executor.run(cases).await.unwrap();

    assert_eq!((summary.total, summary.failed, summary.skipped), (2, 0, 1));
    assert_eq!(claimed.load(Ordering::SeqCst), 1);
    assert_eq!(log.passed(), vec!["Stable.always".to_string()]);
}

struct Handle {
    name: String,
}

impl Dispose for Handle {
    fn dispose(&self) -> anyhow::Result<()> {
        Err(anyhow!("{} still open", self.name))
    }
}

struct Leaky;

impl Startup for Leaky {
    fn configure_host(&self, builder: &mut HostBuilder) {
        builder.without_environment().configure_services(|services| {
            services.add_disposable::<Handle, _>(Lifetime::Named(ScopeLevel::Method), |_| {
                Ok(Arc::new(Handle {
                    name: "method handle".into(),
                }))
            });
        });
    }
}

#[tokio::test]
async fn cleanup_failures_distinct_from_test_failures() {
    let log = Arc::new(MessageLog::new());
    let executor = executor(&log, Leaky);

    let class = TestClass::new("Files", TestCollection::new("c")).into_shared();
    let case = DelegateTestCase::new(TestMethod::new(class, "opens"), |ctx| async move {
        ctx.services.resolve::<Handle>()?;
        Ok(())
    });

    let summary = executor.run(vec![case.into_shared()]).await.unwrap();

    assert_eq!((summary.total, summary.failed), (1, 0));
    assert!(log.failures().is_empty());
    let cleanup = log.cleanup_failures();
    assert_eq!(cleanup.len(), 1);
    assert!(matches!(
        &cleanup[0],
        ExecutionMessage::CleanupFailure { level: ScopeLevel::Method, name, .. }
            if name == "Files.opens"
    ));
    assert!(cleanup[0].to_string().contains("method handle still open"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallelization_can_be_switched_off() {
    let registry = Arc::new(Registry::default());
    let log = Arc::new(MessageLog::new());
    let runtime = InProcessRuntime::new(log.clone()).with_orderer(Arc::new(UniqueIdOrderer));
    let executor = TestFrameworkExecutor::new(Arc::new(runtime))
        .unwrap()
        .with_startup(Arc::new(Services {
            registry,
            parallel: false,
        }));

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let class = TestClass::new("Serial", TestCollection::new("c")).into_shared();
    let cases: Vec<Arc<dyn TestCase>> = ["c", "a", "b"]
        .into_iter()
        .map(|name| {
            let running = running.clone();
            let peak = peak.clone();
            DelegateTestCase::new(TestMethod::new(class.clone(), name), move |_| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_id(name)
            .into_shared()
        })
        .collect();

    let summary = executor.run(cases).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(
        log.passed(),
        vec!["Serial.a".to_string(), "Serial.b".into(), "Serial.c".into()]
    );
}

#[tokio::test]
async fn cancelled_run_dispatches_nothing() {
    let log = Arc::new(MessageLog::new());
    let executor = executor(
        &log,
        Services {
            registry: Arc::new(Registry::default()),
            parallel: true,
        },
    );
    executor.cancellation_token().cancel();

    let class = TestClass::new("Never", TestCollection::new("c")).into_shared();
    let case = DelegateTestCase::new(TestMethod::new(class, "runs"), |_| async { Ok(()) });

    let summary = executor.run(vec![case.into_shared()]).await.unwrap();

    assert_eq!(summary.total, 0);
    assert!(log.passed().is_empty());
}

#[test]
fn host_builder_is_usable_standalone() {
    let mut builder: HostBuilder = Host::builder();
    builder.without_environment();
    let host = builder.build().unwrap();
    assert!(host.options().allow_test_parallelization);
    assert!(host.adapters().is_empty());
}
