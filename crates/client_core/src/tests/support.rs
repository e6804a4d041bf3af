use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{CustomerId, DeviceBrand, DigitalInterest, Gender, ImportId, LocationType},
    protocol::{
        CreateCustomerRequest, CustomerListing, CustomerPage, CustomerRecord, CustomerSummary,
        Envelope, ImportHandle, ImportJobSnapshot, ImportOptions, ImportProgress, ImportState,
        ListRequest,
        UpdateCustomerRequest,
    },
};
use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    customer_client::{CustomerApi, ImportUpload},
    error::{ClientError, ClientResult},
};

/// Serves `app` on an ephemeral local port and returns its base url.
pub(crate) async fn spawn_server(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test app");
    });
    format!("http://{addr}")
}

pub(crate) fn sample_record(number: u64) -> CustomerRecord {
    let at = Utc
        .with_ymd_and_hms(2024, 3, 1, 8, 15, 0)
        .single()
        .expect("valid timestamp");
    CustomerRecord {
        id: CustomerId::new(format!("c-{number}")),
        number,
        location_name: "Jakarta".to_string(),
        date: "2024-03-01".to_string(),
        login_hour: "08:15".to_string(),
        user_name: format!("user{number}"),
        birth_year: 1994,
        actual_age: 30,
        gender: Gender::Female,
        email: format!("user{number}@example.com"),
        phone_number: "+62 811 0000".to_string(),
        device_brand: DeviceBrand::Samsung,
        digital_interest: DigitalInterest::Gaming,
        location_type: LocationType::Urban,
        login_date_time: Some(at),
        created_at: at,
        updated_at: at,
    }
}

pub(crate) fn valid_create_request() -> CreateCustomerRequest {
    CreateCustomerRequest {
        number: 7,
        location_name: "Bandung".to_string(),
        date: "2024-05-10".to_string(),
        login_hour: "14:30".to_string(),
        user_name: "rani".to_string(),
        birth_year: 1990,
        gender: Gender::Female,
        email: "rani@example.com".to_string(),
        phone_number: "+62 812 1111".to_string(),
        device_brand: DeviceBrand::Apple,
        digital_interest: DigitalInterest::Shopping,
        location_type: LocationType::Suburban,
    }
}

pub(crate) fn snapshot(
    id: &str,
    status: ImportState,
    processed: u64,
    total: u64,
) -> ImportJobSnapshot {
    ImportJobSnapshot {
        import_id: ImportId::new(id),
        status,
        file_name: Some("customers.csv".to_string()),
        progress: ImportProgress {
            total_rows: total,
            processed_rows: processed,
            success_count: processed,
            error_count: 0,
        },
        errors: Vec::new(),
        started_at: None,
        completed_at: None,
    }
}

/// How the fake answers list requests.
#[derive(Debug, Clone)]
pub(crate) enum ListScript {
    /// `total` matching records, paged by the request; summary attached when set.
    Paginated { total: u64, summary: Option<CustomerSummary> },
    /// The whole result set as a bare array.
    Bare { count: u64 },
    /// A 2xx envelope with `success: false`.
    Rejected(String),
    /// A non-2xx response.
    ServerError { status: u16, message: String },
}

/// In-memory [`CustomerApi`] whose list responses can be held back per page
/// to force out-of-order completion.
pub(crate) struct FakeApi {
    list_script: StdMutex<ListScript>,
    list_gates: StdMutex<HashMap<u32, oneshot::Receiver<()>>>,
    pub(crate) list_calls: StdMutex<Vec<ListRequest>>,
    statuses: StdMutex<HashMap<ImportId, VecDeque<ImportJobSnapshot>>>,
    pub(crate) cancel_calls: StdMutex<Vec<ImportId>>,
    pub(crate) uploads: StdMutex<Vec<(ImportUpload, ImportOptions)>>,
    submit_reply: StdMutex<ImportHandle>,
    active: StdMutex<Vec<ImportJobSnapshot>>,
}

impl FakeApi {
    pub(crate) fn new(script: ListScript) -> Arc<Self> {
        Arc::new(Self {
            list_script: StdMutex::new(script),
            list_gates: StdMutex::new(HashMap::new()),
            list_calls: StdMutex::new(Vec::new()),
            statuses: StdMutex::new(HashMap::new()),
            cancel_calls: StdMutex::new(Vec::new()),
            uploads: StdMutex::new(Vec::new()),
            submit_reply: StdMutex::new(ImportHandle::Job(snapshot(
                "imp-1",
                ImportState::Queued,
                0,
                0,
            ))),
            active: StdMutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_list_script(&self, script: ListScript) {
        *self.list_script.lock().expect("script lock") = script;
    }

    /// Holds the next list response for `page` until the returned sender fires.
    pub(crate) fn gate_page(&self, page: u32) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.list_gates.lock().expect("gate lock").insert(page, rx);
        tx
    }

    pub(crate) fn list_requests(&self) -> Vec<ListRequest> {
        self.list_calls.lock().expect("calls lock").clone()
    }

    /// Waits until at least `count` list requests have reached the fake.
    pub(crate) async fn wait_for_list_calls(&self, count: usize) {
        for _ in 0..500 {
            if self.list_calls.lock().expect("calls lock").len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {count} list requests");
    }

    /// Status responses for `id`, served in order; the last one repeats.
    pub(crate) fn script_statuses(&self, id: &str, snapshots: Vec<ImportJobSnapshot>) {
        self.statuses
            .lock()
            .expect("status lock")
            .insert(ImportId::new(id), snapshots.into());
    }

    /// Data the next CSV submissions are answered with.
    pub(crate) fn set_submit_reply(&self, reply: ImportHandle) {
        *self.submit_reply.lock().expect("reply lock") = reply;
    }

    pub(crate) fn set_active(&self, jobs: Vec<ImportJobSnapshot>) {
        *self.active.lock().expect("active lock") = jobs;
    }

    fn listing_for(&self, request: &ListRequest) -> ClientResult<Envelope<CustomerListing>> {
        let script = self.list_script.lock().expect("script lock").clone();
        match script {
            ListScript::Paginated { total, summary } => {
                let size = u64::from(request.size.max(1));
                let start = u64::from(request.page.saturating_sub(1)) * size;
                let end = (start + size).min(total);
                let items = (start..end).map(|n| sample_record(n + 1)).collect();
                Ok(Envelope::ok(
                    "ok",
                    CustomerListing::Paginated(CustomerPage {
                        items,
                        total,
                        page: request.page,
                        size: request.size,
                        pages: total.div_ceil(size) as u32,
                        summary,
                    }),
                ))
            }
            ListScript::Bare { count } => Ok(Envelope::ok(
                "ok",
                CustomerListing::Unpaginated {
                    items: (1..=count).map(sample_record).collect(),
                    summary: None,
                },
            )),
            ListScript::Rejected(message) => Ok(Envelope::failure(message)),
            ListScript::ServerError { status, message } => {
                Err(ClientError::Server { status, message })
            }
        }
    }
}

#[async_trait]
impl CustomerApi for FakeApi {
    async fn list(&self, request: &ListRequest) -> ClientResult<Envelope<CustomerListing>> {
        self.list_calls
            .lock()
            .expect("calls lock")
            .push(request.clone());
        let gate = self
            .list_gates
            .lock()
            .expect("gate lock")
            .remove(&request.page);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.listing_for(request)
    }

    async fn get(&self, id: &CustomerId) -> ClientResult<Envelope<CustomerRecord>> {
        match id.as_str() {
            "missing" => Ok(Envelope::failure("")),
            _ => {
                let mut record = sample_record(1);
                record.id = id.clone();
                Ok(Envelope::ok("ok", record))
            }
        }
    }

    async fn create(
        &self,
        _request: &CreateCustomerRequest,
    ) -> ClientResult<Envelope<CustomerRecord>> {
        Ok(Envelope::ok("created", sample_record(1)))
    }

    async fn update(
        &self,
        _id: &CustomerId,
        _request: &UpdateCustomerRequest,
    ) -> ClientResult<Envelope<CustomerRecord>> {
        Ok(Envelope::ok("updated", sample_record(1)))
    }

    async fn delete(&self, _id: &CustomerId) -> ClientResult<Envelope<CustomerRecord>> {
        Ok(Envelope::ok("deleted", sample_record(1)))
    }

    async fn summary(&self) -> ClientResult<Envelope<CustomerSummary>> {
        Ok(Envelope::ok(
            "ok",
            CustomerSummary {
                total_customers: 3,
                ..Default::default()
            },
        ))
    }

    async fn import_csv(
        &self,
        upload: ImportUpload,
        options: &ImportOptions,
    ) -> ClientResult<Envelope<ImportHandle>> {
        self.uploads
            .lock()
            .expect("uploads lock")
            .push((upload, options.clone()));
        let reply = self.submit_reply.lock().expect("reply lock").clone();
        Ok(Envelope::ok("Import started", reply))
    }

    async fn import_status(&self, id: &ImportId) -> ClientResult<Envelope<ImportJobSnapshot>> {
        let mut statuses = self.statuses.lock().expect("status lock");
        let Some(queue) = statuses.get_mut(id) else {
            return Err(ClientError::Server {
                status: 404,
                message: "Import not found".to_string(),
            });
        };
        let current = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match current {
            Some(snapshot) => Ok(Envelope::ok("ok", snapshot)),
            None => Ok(Envelope::failure("Import not found")),
        }
    }

    async fn cancel_import(&self, id: &ImportId) -> ClientResult<Envelope<serde_json::Value>> {
        self.cancel_calls
            .lock()
            .expect("cancel lock")
            .push(id.clone());
        let mut statuses = self.statuses.lock().expect("status lock");
        if let Some(queue) = statuses.get_mut(id) {
            let running = queue.front().filter(|job| !job.status.is_terminal()).cloned();
            if let Some(mut job) = running {
                job.status = ImportState::Cancelled;
                *queue = VecDeque::from(vec![job]);
            }
        }
        Ok(Envelope {
            success: true,
            message: "Cancellation requested".to_string(),
            data: None,
        })
    }

    async fn active_imports(&self) -> ClientResult<Envelope<Vec<ImportJobSnapshot>>> {
        Ok(Envelope::ok(
            "ok",
            self.active.lock().expect("active lock").clone(),
        ))
    }
}
