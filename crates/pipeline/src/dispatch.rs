//! 레코드 디스패처
//!
//! 수집 채널의 레코드를 Processor 체인 → Writer 체인 순서로 흘립니다.
//! 동시 처리 수는 세마포어로 상한이 걸리고, 레코드마다 처리 데드라인이
//! 적용됩니다. 체인 코드가 panic해도 해당 레코드만 잃고 디스패처는
//! 계속 동작합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anylog_core::error::PipelineError;
use anylog_core::metrics::{
    PIPELINE_DISPATCH_DURATION_SECONDS, PIPELINE_RECORDS_DEAD_LETTERED_TOTAL,
    PIPELINE_RECORDS_DISPATCHED_TOTAL, PIPELINE_RECORDS_PANICKED_TOTAL,
    PIPELINE_RECORDS_TIMED_OUT_TOTAL, PIPELINE_WORKERS_BUSY,
};
use anylog_core::pipeline::{Processor, Writer};
use anylog_core::types::LogRecord;
use metrics::{counter, gauge, histogram};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// Processor/Writer 체인. 워커 task들이 공유합니다.
struct Chain {
    processors: Vec<Arc<dyn Processor>>,
    writers: Vec<Arc<dyn Writer>>,
}

impl Chain {
    /// 레코드 하나를 체인 전체에 통과시킵니다.
    fn run(&self, mut record: LogRecord) {
        for processor in &self.processors {
            record = processor.process(record);
        }
        for writer in &self.writers {
            writer.write(&record);
        }
    }
}

/// 레코드 디스패처
pub struct Dispatcher {
    chain: Arc<Chain>,
    dead_letter: Option<Arc<dyn Writer>>,
    workers: Arc<Semaphore>,
    worker_count: usize,
    record_timeout: Duration,
    rx: mpsc::Receiver<LogRecord>,
}

impl Dispatcher {
    /// 새 디스패처를 생성합니다.
    pub fn new(
        processors: Vec<Arc<dyn Processor>>,
        writers: Vec<Arc<dyn Writer>>,
        dead_letter: Option<Arc<dyn Writer>>,
        worker_count: usize,
        record_timeout: Duration,
        rx: mpsc::Receiver<LogRecord>,
    ) -> Self {
        Self {
            chain: Arc::new(Chain { processors, writers }),
            dead_letter,
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            record_timeout,
            rx,
        }
    }

    /// 디스패치 루프를 실행합니다.
    ///
    /// 취소되거나 송신 측이 모두 닫힐 때까지 실행되며, 종료 전에
    /// 진행 중인 레코드가 끝나기를 기다립니다.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PipelineError> {
        tracing::info!(
            workers = self.worker_count,
            record_timeout_ms = self.record_timeout.as_millis() as u64,
            "dispatcher started"
        );

        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                record = self.rx.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };

            // 워커 슬롯 확보. 모두 사용 중이면 여기서 대기하여
            // 채널과 소켓 방향으로 역압이 전달됩니다.
            let permit = self
                .workers
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::InitFailed("worker pool closed".to_owned()))?;
            gauge!(PIPELINE_WORKERS_BUSY).increment(1.0);

            let chain = Arc::clone(&self.chain);
            let dead_letter = self.dead_letter.clone();
            let record_timeout = self.record_timeout;
            tokio::spawn(async move {
                let _permit = permit;
                dispatch_one(chain, dead_letter, record, record_timeout).await;
                gauge!(PIPELINE_WORKERS_BUSY).decrement(1.0);
            });
        }

        // 진행 중인 레코드가 모두 끝나야 풀의 permit이 전부 돌아옴
        let _drain = self
            .workers
            .acquire_many(self.worker_count as u32)
            .await
            .map_err(|_| PipelineError::InitFailed("worker pool closed".to_owned()))?;
        tracing::info!("dispatcher stopped");
        Ok(())
    }
}

/// 레코드 하나를 데드라인과 panic 격리 하에 체인으로 처리합니다.
async fn dispatch_one(
    chain: Arc<Chain>,
    dead_letter: Option<Arc<dyn Writer>>,
    record: LogRecord,
    record_timeout: Duration,
) {
    // 데드레터가 구성된 경우에만 복제 비용을 냄
    let retained = dead_letter.as_ref().map(|_| record.clone());

    let started = Instant::now();
    let work = tokio::task::spawn_blocking(move || chain.run(record));
    match tokio::time::timeout(record_timeout, work).await {
        Ok(Ok(())) => {
            counter!(PIPELINE_RECORDS_DISPATCHED_TOTAL).increment(1);
            histogram!(PIPELINE_DISPATCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }
        Ok(Err(join_err)) => {
            if join_err.is_panic() {
                counter!(PIPELINE_RECORDS_PANICKED_TOTAL).increment(1);
                tracing::warn!("processor/writer chain panicked, record lost");
            }
            send_dead_letter(&dead_letter, retained);
        }
        Err(_elapsed) => {
            // 블로킹 작업 자체는 중단할 수 없어 완료까지 실행될 수 있음
            counter!(PIPELINE_RECORDS_TIMED_OUT_TOTAL).increment(1);
            tracing::warn!(
                timeout_ms = record_timeout.as_millis() as u64,
                "record exceeded processing deadline, abandoned"
            );
            send_dead_letter(&dead_letter, retained);
        }
    }
}

fn send_dead_letter(dead_letter: &Option<Arc<dyn Writer>>, retained: Option<LogRecord>) {
    if let (Some(sink), Some(record)) = (dead_letter, retained) {
        counter!(PIPELINE_RECORDS_DEAD_LETTERED_TOTAL).increment(1);
        sink.write(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWriter {
        seen: AtomicUsize,
    }

    impl Writer for CountingWriter {
        fn write(&self, _record: &LogRecord) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CollectingWriter {
        records: Mutex<Vec<LogRecord>>,
    }

    impl Writer for CollectingWriter {
        fn write(&self, record: &LogRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    struct SuffixProcessor;

    impl Processor for SuffixProcessor {
        fn process(&self, mut record: LogRecord) -> LogRecord {
            let msg = record.get_str("message").unwrap_or_default().to_owned();
            record.insert("message", format!("{msg}!"));
            record
        }
    }

    struct PanickingProcessor;

    impl Processor for PanickingProcessor {
        fn process(&self, _record: LogRecord) -> LogRecord {
            panic!("boom");
        }
    }

    fn record_with_message(msg: &str) -> LogRecord {
        let mut record = LogRecord::new();
        record.insert("message", msg);
        record
    }

    #[tokio::test]
    async fn records_flow_through_chain() {
        let writer = Arc::new(CollectingWriter {
            records: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            vec![Arc::new(SuffixProcessor)],
            vec![writer.clone()],
            None,
            4,
            Duration::from_secs(5),
            rx,
        );

        tx.send(record_with_message("one")).await.unwrap();
        tx.send(record_with_message("two")).await.unwrap();
        drop(tx);

        let cancel = CancellationToken::new();
        dispatcher.run(cancel).await.unwrap();

        let records = writer.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        let mut messages: Vec<&str> =
            records.iter().filter_map(|r| r.get_str("message")).collect();
        messages.sort_unstable();
        assert_eq!(messages, vec!["one!", "two!"]);
    }

    #[tokio::test]
    async fn panicking_record_does_not_stop_dispatcher() {
        let writer = Arc::new(CountingWriter {
            seen: AtomicUsize::new(0),
        });
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            vec![Arc::new(PanickingProcessor)],
            vec![writer.clone()],
            None,
            2,
            Duration::from_secs(5),
            rx,
        );

        tx.send(record_with_message("doomed")).await.unwrap();
        tx.send(record_with_message("also doomed")).await.unwrap();
        drop(tx);

        dispatcher.run(CancellationToken::new()).await.unwrap();
        // writer까지 도달한 레코드는 없어야 함
        assert_eq!(writer.seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicked_record_goes_to_dead_letter() {
        let dead = Arc::new(CollectingWriter {
            records: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            vec![Arc::new(PanickingProcessor)],
            vec![],
            Some(dead.clone()),
            2,
            Duration::from_secs(5),
            rx,
        );

        tx.send(record_with_message("original")).await.unwrap();
        drop(tx);
        dispatcher.run(CancellationToken::new()).await.unwrap();

        let records = dead.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        // 데드레터에는 변형 전 원본이 들어감
        assert_eq!(records[0].get_str("message"), Some("original"));
    }

    #[tokio::test]
    async fn slow_record_times_out() {
        struct SlowProcessor;
        impl Processor for SlowProcessor {
            fn process(&self, record: LogRecord) -> LogRecord {
                std::thread::sleep(Duration::from_millis(200));
                record
            }
        }

        let writer = Arc::new(CountingWriter {
            seen: AtomicUsize::new(0),
        });
        let dead = Arc::new(CollectingWriter {
            records: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            vec![Arc::new(SlowProcessor)],
            vec![writer.clone()],
            Some(dead.clone()),
            2,
            Duration::from_millis(20),
            rx,
        );

        tx.send(record_with_message("slow")).await.unwrap();
        drop(tx);
        dispatcher.run(CancellationToken::new()).await.unwrap();

        assert_eq!(dead.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            vec![],
            vec![],
            None,
            2,
            Duration::from_secs(5),
            rx,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        dispatcher.run(cancel).await.unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        struct GaugedProcessor {
            current: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }
        impl Processor for GaugedProcessor {
            fn process(&self, record: LogRecord) -> LogRecord {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                self.current.fetch_sub(1, Ordering::SeqCst);
                record
            }
        }

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(64);
        let dispatcher = Dispatcher::new(
            vec![Arc::new(GaugedProcessor {
                current: current.clone(),
                peak: peak.clone(),
            })],
            vec![],
            None,
            3,
            Duration::from_secs(5),
            rx,
        );

        for i in 0..12 {
            tx.send(record_with_message(&format!("r{i}"))).await.unwrap();
        }
        drop(tx);
        dispatcher.run(CancellationToken::new()).await.unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(current.load(Ordering::SeqCst), 0);
    }
}
