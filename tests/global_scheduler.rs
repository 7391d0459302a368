// Installing the global scheduler is once per process, so this lives in its
// own test binary with a single test.
#[cfg(test)]
mod tests {
    use settle::{all, ConfigError, Promise, Resolution, Scheduler, SchedulerConfig};
    use std::thread;
    use std::time::Duration;

    fn on_pool_thread() -> bool {
        thread::current()
            .name()
            .map_or(false, |name| name.starts_with("settle-pool-"))
    }

    #[test]
    fn test_pool_installed_as_global() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let pool = SchedulerConfig::new()
            .with_thread_name("settle-pool")
            .and_then(|config| config.with_pool(2))
            .and_then(SchedulerConfig::build)
            .expect("pool scheduler");
        assert!(Scheduler::install_global(pool).is_ok());
        assert!(matches!(
            Scheduler::install_global(Scheduler::inline()),
            Err(ConfigError::GlobalAlreadySet)
        ));

        let (promise, resolver, _) = Promise::<i32>::with_resolvers();
        let chained = promise
            .then(|x| Resolution::Value((x * 2, on_pool_thread())))
            .then(|(x, pooled)| Resolution::Value((x + 1, pooled && on_pool_thread())));
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(4);
        });
        assert_eq!(chained.wait().unwrap(), (9, true));

        let inputs: Vec<Promise<i32>> = (1..=4)
            .map(|i| {
                Promise::new(move |resolve, _| {
                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(10 * (5 - i) as u64));
                        resolve.resolve(i);
                    });
                    Ok(())
                })
            })
            .collect();
        let combined = all(inputs).then(|values| Resolution::Value((values, on_pool_thread())));
        assert_eq!(combined.wait().unwrap(), (vec![1, 2, 3, 4], true));
    }
}
