//! ClusterClaim controller implementation
//!
//! Keeps the ManagedCluster and KlusterletAddonConfig of every bound
//! ClusterClaim in step with the claim: both are created when missing and
//! deleted once the claim is being deleted. Every call recomputes the desired
//! state from a fresh read of the claim; nothing is remembered between calls.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use clusterclaims_common::crd::{
    ClusterClaim, KlusterletAddonConfig, ManagedCluster, Terminating,
};
use clusterclaims_common::{metrics, Error, KindRegistry, RecordType, NAME_LABEL_KEY};

use crate::desired::{self, AddonSettings};
use crate::store::{KubeStore, ObjectKey, ObjectStore};

/// Requeue delay after a failed reconcile when none is configured
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Identifies the claim to reconcile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    /// Namespace of the claim
    pub namespace: String,
    /// Name of the claim
    pub name: String,
}

impl ReconcileRequest {
    /// Request for the claim `namespace/name`
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(self.namespace.clone(), self.name.clone())
    }
}

impl From<&ClusterClaim> for ReconcileRequest {
    fn from(claim: &ClusterClaim) -> Self {
        Self::new(claim.namespace().unwrap_or_default(), claim.name_any())
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What a successful reconcile found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The claim no longer exists
    Missing,
    /// The claim has no cluster assigned yet
    Unbound,
    /// Both downstream records exist
    Ensured,
    /// The claim is being deleted and its downstream records were handled
    TornDown,
}

impl ReconcileOutcome {
    /// Metric attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Unbound => "unbound",
            Self::Ensured => "ensured",
            Self::TornDown => "torn_down",
        }
    }
}

/// Result of making sure a downstream record exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensure {
    /// The record was missing and has been created
    Created,
    /// The record already existed and was left untouched
    AlreadyPresent,
}

/// Result of tearing down a downstream record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// A delete was issued
    Deleted,
    /// The record is already being deleted, nothing to do
    AlreadyTerminating,
    /// The record does not exist
    Absent,
}

/// Runtime settings for the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Delay before a failed claim is reconciled again
    pub error_requeue: Duration,
    /// Add-on settings for new KlusterletAddonConfigs
    pub addons: AddonSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            error_requeue: DEFAULT_ERROR_REQUEUE,
            addons: AddonSettings::default(),
        }
    }
}

/// Drives the ManagedCluster and KlusterletAddonConfig of a claim to match it
pub struct ClaimReconciler {
    claims: Arc<dyn ObjectStore<ClusterClaim>>,
    managed_clusters: Arc<dyn ObjectStore<ManagedCluster>>,
    addon_configs: Arc<dyn ObjectStore<KlusterletAddonConfig>>,
    addons: AddonSettings,
}

impl ClaimReconciler {
    /// Create a reconciler over the given stores
    pub fn new(
        claims: Arc<dyn ObjectStore<ClusterClaim>>,
        managed_clusters: Arc<dyn ObjectStore<ManagedCluster>>,
        addon_configs: Arc<dyn ObjectStore<KlusterletAddonConfig>>,
        addons: AddonSettings,
    ) -> Self {
        Self {
            claims,
            managed_clusters,
            addon_configs,
            addons,
        }
    }

    /// Converge the downstream records of one claim
    ///
    /// A missing or unbound claim is a successful no-op. Store failures are
    /// returned as-is; retrying them is up to the caller.
    #[instrument(skip_all, fields(claim = %request))]
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileOutcome, Error> {
        let Some(claim) = self.claims.get(&request.key()).await? else {
            debug!("Claim not found, nothing to do");
            return Ok(ReconcileOutcome::Missing);
        };

        let Some(cluster) = claim.target_cluster() else {
            debug!("Claim has no cluster assigned yet");
            return Ok(ReconcileOutcome::Unbound);
        };

        if claim.is_terminating() {
            info!(cluster = %cluster, "Claim is being deleted, removing cluster records");
            let registration =
                teardown(self.managed_clusters.as_ref(), &registration_key(cluster)).await?;
            let configuration =
                teardown(self.addon_configs.as_ref(), &configuration_key(cluster)).await?;
            info!(
                cluster = %cluster,
                managed_cluster = ?registration,
                addon_config = ?configuration,
                "Cluster records handled"
            );
            return Ok(ReconcileOutcome::TornDown);
        }

        let registration = self.ensure_registration(&claim, cluster).await?;
        let configuration = self.ensure_configuration(&claim, cluster).await?;
        debug!(
            cluster = %cluster,
            managed_cluster = ?registration,
            addon_config = ?configuration,
            "Cluster records ensured"
        );
        Ok(ReconcileOutcome::Ensured)
    }

    async fn ensure_registration(
        &self,
        claim: &ClusterClaim,
        cluster: &str,
    ) -> Result<Ensure, Error> {
        if let Some(existing) = self.managed_clusters.get(&registration_key(cluster)).await? {
            let owner = existing.labels().get(NAME_LABEL_KEY);
            if owner.is_some_and(|owner| *owner != claim.name_any()) {
                warn!(
                    cluster = %cluster,
                    labelled_claim = ?owner,
                    "ManagedCluster is labelled for a different claim, leaving it untouched"
                );
            }
            return Ok(Ensure::AlreadyPresent);
        }

        let mc = desired::managed_cluster(claim, cluster);
        self.managed_clusters.create(&mc).await?;
        metrics::record_created(ManagedCluster::KIND);
        info!(cluster = %cluster, "Created ManagedCluster");
        Ok(Ensure::Created)
    }

    async fn ensure_configuration(
        &self,
        claim: &ClusterClaim,
        cluster: &str,
    ) -> Result<Ensure, Error> {
        if self
            .addon_configs
            .get(&configuration_key(cluster))
            .await?
            .is_some()
        {
            return Ok(Ensure::AlreadyPresent);
        }

        let labels = desired::registration_labels(claim);
        let kac = desired::addon_config(cluster, &labels, &self.addons);
        self.addon_configs.create(&kac).await?;
        metrics::record_created(KlusterletAddonConfig::KIND);
        info!(cluster = %cluster, "Created KlusterletAddonConfig");
        Ok(Ensure::Created)
    }
}

fn registration_key(cluster: &str) -> ObjectKey {
    ObjectKey::cluster_scoped(cluster)
}

fn configuration_key(cluster: &str) -> ObjectKey {
    ObjectKey::namespaced(cluster, cluster)
}

/// Delete the record at `key` unless it is absent or already terminating
async fn teardown<K: RecordType>(
    store: &dyn ObjectStore<K>,
    key: &ObjectKey,
) -> Result<Teardown, Error> {
    let kind = K::KIND.kind_str();
    match store.get(key).await? {
        None => {
            debug!(kind, key = %key, "Record already gone");
            Ok(Teardown::Absent)
        }
        Some(obj) if obj.is_terminating() => {
            debug!(kind, key = %key, "Record already terminating, skipping delete");
            Ok(Teardown::AlreadyTerminating)
        }
        Some(obj) => {
            store.delete(&obj).await?;
            metrics::record_deleted(K::KIND);
            info!(kind, key = %key, "Deleted record");
            Ok(Teardown::Deleted)
        }
    }
}

/// Controller context shared by every reconcile
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client, registry)
///     .settings(settings)
///     .build();
/// ```
pub struct Context {
    /// Claim reconciler (stores are trait objects for testability)
    pub reconciler: ClaimReconciler,
    /// Delay before a failed claim is retried
    pub error_requeue: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, registry: Arc<KindRegistry>) -> ContextBuilder {
        ContextBuilder::new(client, registry)
    }

    /// Create a context for testing with custom stores
    #[cfg(test)]
    pub fn for_testing(
        claims: Arc<dyn ObjectStore<ClusterClaim>>,
        managed_clusters: Arc<dyn ObjectStore<ManagedCluster>>,
        addon_configs: Arc<dyn ObjectStore<KlusterletAddonConfig>>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            reconciler: ClaimReconciler::new(
                claims,
                managed_clusters,
                addon_configs,
                settings.addons,
            ),
            error_requeue: settings.error_requeue,
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// Every store is a [`KubeStore`] over the given client and kind registry.
pub struct ContextBuilder {
    client: Client,
    registry: Arc<KindRegistry>,
    settings: ControllerSettings,
}

impl ContextBuilder {
    fn new(client: Client, registry: Arc<KindRegistry>) -> Self {
        Self {
            client,
            registry,
            settings: ControllerSettings::default(),
        }
    }

    /// Set the controller settings
    pub fn settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kube = Arc::new(KubeStore::new(self.client, self.registry));
        let claims: Arc<dyn ObjectStore<ClusterClaim>> = kube.clone();
        let managed_clusters: Arc<dyn ObjectStore<ManagedCluster>> = kube.clone();
        let addon_configs: Arc<dyn ObjectStore<KlusterletAddonConfig>> = kube;

        Context {
            reconciler: ClaimReconciler::new(
                claims,
                managed_clusters,
                addon_configs,
                self.settings.addons,
            ),
            error_requeue: self.settings.error_requeue,
        }
    }
}

/// Reconcile a ClusterClaim
///
/// Adapter between the `kube::runtime` controller and [`ClaimReconciler`]:
/// the watched object only identifies the claim, which is read again through
/// the store. Success waits for the next change event.
pub async fn reconcile(claim: Arc<ClusterClaim>, ctx: Arc<Context>) -> Result<Action, Error> {
    let request = ReconcileRequest::from(claim.as_ref());
    let start = Instant::now();

    match ctx.reconciler.reconcile(&request).await {
        Ok(outcome) => {
            metrics::record_reconcile_success(outcome.as_str(), start.elapsed());
            Ok(Action::await_change())
        }
        Err(e) => {
            metrics::record_reconcile_error(e.kind_label(), start.elapsed());
            Err(e)
        }
    }
}

/// Error policy for the controller
///
/// Logs the error and requeues the claim after the configured delay.
pub fn error_policy(claim: Arc<ClusterClaim>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        claim = %ReconcileRequest::from(claim.as_ref()),
        retryable = error.is_retryable(),
        "Reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::Resource;

    use clusterclaims_common::crd::{
        ClusterClaimSpec, KlusterletAddonConfigSpec, ManagedClusterSpec,
    };
    use clusterclaims_common::RecordKind;

    use crate::desired::Addon;
    use crate::store::MockObjectStore;

    const CC_NAME: &str = "my-clusterclaim";
    const CC_NAMESPACE: &str = "my-pool";
    const CLUSTER01: &str = "cluster01";

    fn api_error(code: u16, reason: &str) -> Error {
        Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("request failed: {}", reason),
            reason: reason.to_string(),
            code,
        }))
    }

    fn deletion_marker() -> Option<Time> {
        Some(Time(chrono::Utc::now()))
    }

    /// Claim `my-pool/my-clusterclaim` labelled usage=production, bound to cluster01
    fn sample_claim() -> ClusterClaim {
        let mut claim = ClusterClaim::new(
            CC_NAME,
            ClusterClaimSpec {
                cluster_pool_name: "make-believe".to_string(),
                namespace: Some(CLUSTER01.to_string()),
                ..Default::default()
            },
        );
        claim.metadata.namespace = Some(CC_NAMESPACE.to_string());
        claim.metadata.labels = Some([("usage".to_string(), "production".to_string())].into());
        claim
    }

    fn deleting_claim() -> ClusterClaim {
        let mut claim = sample_claim();
        claim.metadata.deletion_timestamp = deletion_marker();
        claim
    }

    fn existing_managed_cluster() -> ManagedCluster {
        ManagedCluster::new(CLUSTER01, ManagedClusterSpec::default())
    }

    fn existing_addon_config() -> KlusterletAddonConfig {
        let mut kac = KlusterletAddonConfig::new(CLUSTER01, KlusterletAddonConfigSpec::default());
        kac.metadata.namespace = Some(CLUSTER01.to_string());
        kac
    }

    fn request() -> ReconcileRequest {
        ReconcileRequest::new(CC_NAMESPACE, CC_NAME)
    }

    /// In-memory store with API-server-like create/delete semantics
    struct MemoryStore<K> {
        objects: Mutex<BTreeMap<ObjectKey, K>>,
        creates: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl<K: RecordType> MemoryStore<K> {
        fn new() -> Self {
            Self {
                objects: Mutex::new(BTreeMap::new()),
                creates: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
            }
        }

        fn with(objects: impl IntoIterator<Item = K>) -> Self {
            let store = Self::new();
            for obj in objects {
                store.insert(obj);
            }
            store
        }

        fn insert(&self, obj: K) {
            self.objects.lock().unwrap().insert(ObjectKey::of(&obj), obj);
        }

        fn lookup(&self, key: &ObjectKey) -> Option<K> {
            self.objects.lock().unwrap().get(key).cloned()
        }

        fn creates(&self) -> usize {
            self.creates.load(Ordering::SeqCst)
        }

        fn deletes(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<K: RecordType> ObjectStore<K> for MemoryStore<K> {
        async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error> {
            Ok(self.lookup(key))
        }

        async fn create(&self, obj: &K) -> Result<(), Error> {
            let mut objects = self.objects.lock().unwrap();
            let key = ObjectKey::of(obj);
            if objects.contains_key(&key) {
                return Err(api_error(409, "AlreadyExists"));
            }
            objects.insert(key, obj.clone());
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete(&self, obj: &K) -> Result<(), Error> {
            self.objects.lock().unwrap().remove(&ObjectKey::of(obj));
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        claims: Arc<MemoryStore<ClusterClaim>>,
        managed_clusters: Arc<MemoryStore<ManagedCluster>>,
        addon_configs: Arc<MemoryStore<KlusterletAddonConfig>>,
    }

    impl Fixture {
        fn new(
            claims: Vec<ClusterClaim>,
            managed_clusters: Vec<ManagedCluster>,
            addon_configs: Vec<KlusterletAddonConfig>,
        ) -> Self {
            Self {
                claims: Arc::new(MemoryStore::with(claims)),
                managed_clusters: Arc::new(MemoryStore::with(managed_clusters)),
                addon_configs: Arc::new(MemoryStore::with(addon_configs)),
            }
        }

        fn context_with(&self, settings: ControllerSettings) -> Arc<Context> {
            Arc::new(Context::for_testing(
                self.claims.clone(),
                self.managed_clusters.clone(),
                self.addon_configs.clone(),
                settings,
            ))
        }

        fn context(&self) -> Arc<Context> {
            self.context_with(ControllerSettings::default())
        }

        fn managed_cluster(&self) -> Option<ManagedCluster> {
            self.managed_clusters
                .lookup(&ObjectKey::cluster_scoped(CLUSTER01))
        }

        fn addon_config(&self) -> Option<KlusterletAddonConfig> {
            self.addon_configs
                .lookup(&ObjectKey::namespaced(CLUSTER01, CLUSTER01))
        }
    }

    fn mock_context(
        claims: MockObjectStore<ClusterClaim>,
        managed_clusters: MockObjectStore<ManagedCluster>,
        addon_configs: MockObjectStore<KlusterletAddonConfig>,
    ) -> Arc<Context> {
        Arc::new(Context::for_testing(
            Arc::new(claims),
            Arc::new(managed_clusters),
            Arc::new(addon_configs),
            ControllerSettings::default(),
        ))
    }

    fn claim_store_returning(claim: ClusterClaim) -> MockObjectStore<ClusterClaim> {
        let mut claims = MockObjectStore::<ClusterClaim>::new();
        claims
            .expect_get()
            .returning(move |_| Ok(Some(claim.clone())));
        claims.expect_create().never();
        claims.expect_delete().never();
        claims
    }

    mod state_scenarios {
        use super::*;

        /// Story: a newly bound claim gets a ManagedCluster carrying its
        /// labels and a KlusterletAddonConfig propagating the vendor.
        #[tokio::test]
        async fn story_bound_claim_creates_registration_and_configuration() {
            let fixture = Fixture::new(vec![sample_claim()], vec![], vec![]);
            let ctx = fixture.context();

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Ensured);

            let mc = fixture.managed_cluster().expect("ManagedCluster should exist");
            assert_eq!(mc.labels()["name"], CC_NAME);
            assert_eq!(mc.labels()["vendor"], "OpenShift");
            assert_eq!(mc.labels()["usage"], "production");
            assert!(mc.spec.hub_accepts_client);

            let kac = fixture.addon_config().expect("KlusterletAddonConfig should exist");
            assert_eq!(kac.spec.cluster_labels["vendor"], "OpenShift");
            assert_eq!(kac.spec.cluster_name, CLUSTER01);
            assert_eq!(kac.spec.cluster_namespace, CLUSTER01);
        }

        /// Story: records created by someone else are accepted as they are.
        #[tokio::test]
        async fn story_existing_records_are_left_untouched() {
            let fixture = Fixture::new(
                vec![sample_claim()],
                vec![existing_managed_cluster()],
                vec![existing_addon_config()],
            );
            let ctx = fixture.context();

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Ensured);

            assert_eq!(fixture.managed_clusters.creates(), 0);
            assert_eq!(fixture.addon_configs.creates(), 0);
            assert_eq!(fixture.managed_cluster(), Some(existing_managed_cluster()));
            assert_eq!(fixture.addon_config(), Some(existing_addon_config()));
        }

        /// Story: deleting the claim deletes both cluster records.
        #[tokio::test]
        async fn story_deleted_claim_removes_records() {
            let fixture = Fixture::new(
                vec![deleting_claim()],
                vec![existing_managed_cluster()],
                vec![existing_addon_config()],
            );
            let ctx = fixture.context();

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::TornDown);

            assert!(fixture.managed_cluster().is_none());
            assert!(fixture.addon_config().is_none());
            assert_eq!(fixture.managed_clusters.deletes(), 1);
            assert_eq!(fixture.addon_configs.deletes(), 1);
        }

        /// Story: records already on their way out are not deleted again.
        #[tokio::test]
        async fn story_terminating_records_are_skipped() {
            let mut mc = existing_managed_cluster();
            mc.metadata.deletion_timestamp = deletion_marker();
            let mut kac = existing_addon_config();
            kac.metadata.deletion_timestamp = deletion_marker();

            let fixture = Fixture::new(vec![deleting_claim()], vec![mc], vec![kac]);
            let ctx = fixture.context();

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::TornDown);

            assert!(fixture.managed_cluster().is_some());
            assert!(fixture.addon_config().is_some());
            assert_eq!(fixture.managed_clusters.deletes(), 0);
            assert_eq!(fixture.addon_configs.deletes(), 0);
        }

        #[tokio::test]
        async fn deleted_claim_without_records_succeeds() {
            let fixture = Fixture::new(vec![deleting_claim()], vec![], vec![]);
            let ctx = fixture.context();

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::TornDown);
            assert_eq!(fixture.managed_clusters.deletes(), 0);
            assert_eq!(fixture.addon_configs.deletes(), 0);
        }

        /// Story: reconciling twice without outside changes has no further
        /// side effects, for both the ensure and the teardown paths.
        #[tokio::test]
        async fn story_reconcile_is_idempotent() {
            let fixture = Fixture::new(vec![sample_claim()], vec![], vec![]);
            let ctx = fixture.context();

            ctx.reconciler.reconcile(&request()).await.unwrap();
            let mc = fixture.managed_cluster();
            let kac = fixture.addon_config();
            ctx.reconciler.reconcile(&request()).await.unwrap();

            assert_eq!(fixture.managed_clusters.creates(), 1);
            assert_eq!(fixture.addon_configs.creates(), 1);
            assert_eq!(fixture.managed_cluster(), mc);
            assert_eq!(fixture.addon_config(), kac);

            fixture.claims.insert(deleting_claim());
            ctx.reconciler.reconcile(&request()).await.unwrap();
            ctx.reconciler.reconcile(&request()).await.unwrap();

            assert_eq!(fixture.managed_clusters.deletes(), 1);
            assert_eq!(fixture.addon_configs.deletes(), 1);
            assert!(fixture.managed_cluster().is_none());
            assert!(fixture.addon_config().is_none());
        }

        #[tokio::test]
        async fn unbound_claim_is_a_no_op() {
            for target in [None, Some(String::new())] {
                let mut claim = sample_claim();
                claim.spec.namespace = target;
                let fixture = Fixture::new(vec![claim], vec![], vec![]);
                let ctx = fixture.context();

                let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
                assert_eq!(outcome, ReconcileOutcome::Unbound);
                assert_eq!(fixture.managed_clusters.creates(), 0);
                assert_eq!(fixture.addon_configs.creates(), 0);
            }
        }

        #[tokio::test]
        async fn unbound_deleting_claim_is_a_no_op() {
            let mut claim = deleting_claim();
            claim.spec.namespace = None;
            let fixture = Fixture::new(
                vec![claim],
                vec![existing_managed_cluster()],
                vec![existing_addon_config()],
            );
            let ctx = fixture.context();

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Unbound);
            assert_eq!(fixture.managed_clusters.deletes(), 0);
            assert_eq!(fixture.addon_configs.deletes(), 0);
        }

        #[tokio::test]
        async fn missing_claim_is_a_no_op() {
            let fixture = Fixture::new(vec![], vec![], vec![]);
            let ctx = fixture.context();

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Missing);
            assert!(fixture.managed_cluster().is_none());
            assert!(fixture.addon_config().is_none());
        }

        #[tokio::test]
        async fn addon_settings_flow_into_new_configuration() {
            let fixture = Fixture::new(vec![sample_claim()], vec![], vec![]);
            let ctx = fixture.context_with(ControllerSettings {
                error_requeue: DEFAULT_ERROR_REQUEUE,
                addons: AddonSettings {
                    version: "2.4.0".to_string(),
                    disabled: [Addon::ApplicationManager].into(),
                },
            });

            ctx.reconciler.reconcile(&request()).await.unwrap();

            let kac = fixture.addon_config().expect("KlusterletAddonConfig should exist");
            assert_eq!(kac.spec.version, "2.4.0");
            assert!(!kac.spec.application_manager.enabled);
            assert!(kac.spec.policy_controller.enabled);
        }

        /// Story: a ManagedCluster labelled for another claim is reported
        /// but never rewritten.
        #[tokio::test]
        async fn story_foreign_registration_is_not_rewritten() {
            let mut mc = existing_managed_cluster();
            mc.metadata.labels = Some([("name".to_string(), "other-claim".to_string())].into());
            let fixture = Fixture::new(vec![sample_claim()], vec![mc.clone()], vec![]);
            let ctx = fixture.context();

            ctx.reconciler.reconcile(&request()).await.unwrap();

            assert_eq!(fixture.managed_cluster(), Some(mc));
            assert_eq!(fixture.addon_configs.creates(), 1);
        }
    }

    mod error_propagation {
        use super::*;

        #[tokio::test]
        async fn claim_fetch_failure_is_returned() {
            let mut claims = MockObjectStore::<ClusterClaim>::new();
            claims
                .expect_get()
                .returning(|_| Err(api_error(500, "InternalError")));
            let mut mcs = MockObjectStore::<ManagedCluster>::new();
            mcs.expect_get().never();
            let mut kacs = MockObjectStore::<KlusterletAddonConfig>::new();
            kacs.expect_get().never();

            let ctx = mock_context(claims, mcs, kacs);
            let err = ctx.reconciler.reconcile(&request()).await.unwrap_err();
            assert!(matches!(err, Error::Kube { .. }));
        }

        /// Story: when creating the ManagedCluster fails, the error surfaces
        /// and the configuration is not attempted in the same pass.
        #[tokio::test]
        async fn story_registration_create_failure_stops_the_pass() {
            let mut mcs = MockObjectStore::<ManagedCluster>::new();
            mcs.expect_get().returning(|_| Ok(None));
            mcs.expect_create()
                .times(1)
                .returning(|_| Err(api_error(403, "Forbidden")));
            let mut kacs = MockObjectStore::<KlusterletAddonConfig>::new();
            kacs.expect_get().never();
            kacs.expect_create().never();

            let ctx = mock_context(claim_store_returning(sample_claim()), mcs, kacs);
            let err = ctx.reconciler.reconcile(&request()).await.unwrap_err();
            assert!(!err.is_retryable());
        }

        #[tokio::test]
        async fn configuration_fetch_failure_is_returned() {
            let mut mcs = MockObjectStore::<ManagedCluster>::new();
            mcs.expect_get()
                .returning(|_| Ok(Some(existing_managed_cluster())));
            mcs.expect_create().never();
            let mut kacs = MockObjectStore::<KlusterletAddonConfig>::new();
            kacs.expect_get()
                .returning(|_| Err(api_error(503, "ServiceUnavailable")));
            kacs.expect_create().never();

            let ctx = mock_context(claim_store_returning(sample_claim()), mcs, kacs);
            let err = ctx.reconciler.reconcile(&request()).await.unwrap_err();
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn delete_failure_is_returned() {
            let mut mcs = MockObjectStore::<ManagedCluster>::new();
            mcs.expect_get()
                .returning(|_| Ok(Some(existing_managed_cluster())));
            mcs.expect_delete()
                .times(1)
                .returning(|_| Err(api_error(500, "InternalError")));
            let mut kacs = MockObjectStore::<KlusterletAddonConfig>::new();
            kacs.expect_get().never();

            let ctx = mock_context(claim_store_returning(deleting_claim()), mcs, kacs);
            assert!(ctx.reconciler.reconcile(&request()).await.is_err());
        }

        /// Story: a record that vanishes between read and delete counts as
        /// deleted (the store reports not-found on delete as success).
        #[tokio::test]
        async fn story_delete_race_with_garbage_collection_succeeds() {
            let mut mcs = MockObjectStore::<ManagedCluster>::new();
            mcs.expect_get()
                .returning(|_| Ok(Some(existing_managed_cluster())));
            mcs.expect_delete().times(1).returning(|_| Ok(()));
            let mut kacs = MockObjectStore::<KlusterletAddonConfig>::new();
            kacs.expect_get().returning(|_| Ok(None));
            kacs.expect_delete().never();

            let ctx = mock_context(claim_store_returning(deleting_claim()), mcs, kacs);
            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::TornDown);
        }

        #[tokio::test]
        async fn unknown_kind_is_returned() {
            let mut mcs = MockObjectStore::<ManagedCluster>::new();
            mcs.expect_get().returning(|_| {
                Err(Error::UnknownKind {
                    kind: RecordKind::ManagedCluster,
                })
            });
            let mut kacs = MockObjectStore::<KlusterletAddonConfig>::new();
            kacs.expect_get().never();

            let ctx = mock_context(claim_store_returning(sample_claim()), mcs, kacs);
            let err = ctx.reconciler.reconcile(&request()).await.unwrap_err();
            assert_eq!(err.kind_label(), "unknown_kind");
        }

        #[tokio::test]
        async fn lookups_use_the_cluster_keys() {
            let mut mcs = MockObjectStore::<ManagedCluster>::new();
            mcs.expect_get()
                .withf(|key| *key == ObjectKey::cluster_scoped(CLUSTER01))
                .returning(|_| Ok(Some(existing_managed_cluster())));
            let mut kacs = MockObjectStore::<KlusterletAddonConfig>::new();
            kacs.expect_get()
                .withf(|key| *key == ObjectKey::namespaced(CLUSTER01, CLUSTER01))
                .returning(|_| Ok(Some(existing_addon_config())));

            let mut claims = MockObjectStore::<ClusterClaim>::new();
            claims
                .expect_get()
                .withf(|key| *key == ObjectKey::namespaced(CC_NAMESPACE, CC_NAME))
                .returning(|_| Ok(Some(sample_claim())));

            let ctx = mock_context(claims, mcs, kacs);
            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Ensured);
        }
    }

    mod framework_adapter {
        use super::*;

        #[tokio::test]
        async fn success_waits_for_the_next_change() {
            let fixture = Fixture::new(vec![sample_claim()], vec![], vec![]);
            let action = reconcile(Arc::new(sample_claim()), fixture.context())
                .await
                .unwrap();
            assert_eq!(action, Action::await_change());
            assert!(fixture.managed_cluster().is_some());
        }

        /// Story: the watched object only names the claim; the reconciler
        /// acts on what the store returns, not on the event payload.
        #[tokio::test]
        async fn story_adapter_rereads_the_claim() {
            let fixture = Fixture::new(
                vec![deleting_claim()],
                vec![existing_managed_cluster()],
                vec![],
            );
            reconcile(Arc::new(sample_claim()), fixture.context())
                .await
                .unwrap();
            assert!(fixture.managed_cluster().is_none());
            assert_eq!(fixture.addon_configs.creates(), 0);
        }

        #[tokio::test]
        async fn error_policy_requeues_after_configured_delay() {
            let fixture = Fixture::new(vec![], vec![], vec![]);
            let ctx = fixture.context_with(ControllerSettings {
                error_requeue: Duration::from_secs(17),
                ..Default::default()
            });
            let action = error_policy(
                Arc::new(sample_claim()),
                &api_error(500, "InternalError"),
                ctx,
            );
            assert_eq!(action, Action::requeue(Duration::from_secs(17)));
        }

        #[test]
        fn request_from_claim_uses_its_identity() {
            let request = ReconcileRequest::from(&sample_claim());
            assert_eq!(request, ReconcileRequest::new(CC_NAMESPACE, CC_NAME));
            assert_eq!(request.to_string(), "my-pool/my-clusterclaim");
            assert_eq!(sample_claim().meta().namespace.as_deref(), Some(CC_NAMESPACE));
        }
    }

    mod against_api_server {
        use super::*;
        use serde_json::json;

        use crate::store::api_server::{self, Received};

        const CLAIM_PATH: &str =
            "/apis/hive.openshift.io/v1/namespaces/my-pool/clusterclaims/my-clusterclaim";
        const MANAGED_CLUSTERS_PATH: &str =
            "/apis/cluster.open-cluster-management.io/v1/managedclusters";
        const MANAGED_CLUSTER_PATH: &str =
            "/apis/cluster.open-cluster-management.io/v1/managedclusters/cluster01";
        const ADDON_CONFIGS_PATH: &str =
            "/apis/agent.open-cluster-management.io/v1/namespaces/cluster01/klusterletaddonconfigs";
        const ADDON_CONFIG_PATH: &str =
            "/apis/agent.open-cluster-management.io/v1/namespaces/cluster01/klusterletaddonconfigs/cluster01";

        fn kube_context() -> (Context, api_server::ApiHandle) {
            let (client, handle) = api_server::client();
            let ctx = Context::builder(client, Arc::new(KindRegistry::hardcoded_defaults())).build();
            (ctx, handle)
        }

        fn calls(seen: &[Received]) -> Vec<(&str, &str)> {
            seen.iter()
                .map(|r| (r.method.as_str(), r.path.as_str()))
                .collect()
        }

        /// Story: a newly bound claim is registered on the hub with exactly
        /// one ManagedCluster create and one KlusterletAddonConfig create.
        #[tokio::test]
        async fn story_bound_claim_creates_both_records() {
            let (ctx, mut handle) = kube_context();
            let claim = serde_json::to_value(sample_claim()).unwrap();
            let server = tokio::spawn(async move {
                vec![
                    api_server::answer(&mut handle, 200, claim).await,
                    api_server::not_found(&mut handle).await,
                    api_server::accept_create(&mut handle).await,
                    api_server::not_found(&mut handle).await,
                    api_server::accept_create(&mut handle).await,
                ]
            });

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Ensured);
            drop(ctx);

            let seen = server.await.expect("server task should finish");
            assert_eq!(
                calls(&seen),
                vec![
                    ("GET", CLAIM_PATH),
                    ("GET", MANAGED_CLUSTER_PATH),
                    ("POST", MANAGED_CLUSTERS_PATH),
                    ("GET", ADDON_CONFIG_PATH),
                    ("POST", ADDON_CONFIGS_PATH),
                ]
            );

            let mc = &seen[2].body;
            assert_eq!(mc["kind"], "ManagedCluster");
            assert_eq!(mc["metadata"]["name"], CLUSTER01);
            assert_eq!(
                mc["metadata"]["labels"],
                json!({ "name": CC_NAME, "usage": "production", "vendor": "OpenShift" })
            );
            assert_eq!(mc["spec"]["hubAcceptsClient"], true);

            let kac = &seen[4].body;
            assert_eq!(kac["kind"], "KlusterletAddonConfig");
            assert_eq!(kac["metadata"]["namespace"], CLUSTER01);
            assert_eq!(kac["spec"]["clusterName"], CLUSTER01);
            assert_eq!(kac["spec"]["clusterNamespace"], CLUSTER01);
            assert_eq!(kac["spec"]["clusterLabels"]["vendor"], "OpenShift");
            assert_eq!(kac["spec"]["version"], desired::DEFAULT_ADDON_VERSION);
        }

        /// Story: the claim is deleted while the garbage collector is
        /// already removing its cluster; a 404 on delete is not a failure.
        #[tokio::test]
        async fn story_deleted_claim_tolerates_records_vanishing() {
            let (ctx, mut handle) = kube_context();
            let claim = serde_json::to_value(deleting_claim()).unwrap();
            let mc = serde_json::to_value(existing_managed_cluster()).unwrap();
            let server = tokio::spawn(async move {
                vec![
                    api_server::answer(&mut handle, 200, claim).await,
                    api_server::answer(&mut handle, 200, mc).await,
                    api_server::not_found(&mut handle).await,
                    api_server::not_found(&mut handle).await,
                ]
            });

            let outcome = ctx.reconciler.reconcile(&request()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::TornDown);
            drop(ctx);

            let seen = server.await.expect("server task should finish");
            assert_eq!(
                calls(&seen),
                vec![
                    ("GET", CLAIM_PATH),
                    ("GET", MANAGED_CLUSTER_PATH),
                    ("DELETE", MANAGED_CLUSTER_PATH),
                    ("GET", ADDON_CONFIG_PATH),
                ]
            );
        }

        #[tokio::test]
        async fn server_failure_fails_the_pass() {
            let (ctx, mut handle) = kube_context();
            let claim = serde_json::to_value(sample_claim()).unwrap();
            let server = tokio::spawn(async move {
                vec![
                    api_server::answer(&mut handle, 200, claim).await,
                    api_server::answer(&mut handle, 500, api_server::failure(500, "InternalError"))
                        .await,
                ]
            });

            let err = ctx.reconciler.reconcile(&request()).await.unwrap_err();
            assert_eq!(err.kind_label(), "kube");
            drop(ctx);

            let seen = server.await.expect("server task should finish");
            assert_eq!(
                calls(&seen),
                vec![("GET", CLAIM_PATH), ("GET", MANAGED_CLUSTER_PATH)]
            );
        }
    }
}
