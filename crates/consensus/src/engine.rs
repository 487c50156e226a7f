// consensus/src/engine.rs

use crate::election::{ProposerElector, StakeDistribution};
use crate::events::ConsensusEvents;
use crate::governance::{GovernanceDiff, GovernanceQueue};
use crate::interfaces::{Clock, ExecutionLayer, TokenSupply, VoteTransport};
use crate::params::ConsensusParams;
use crate::registry::{ActiveSet, Validator, ValidatorRegistry};
use crate::rewards::RewardAccountant;
use crate::slashing::{SlashLedger, SlashReason};
use crate::votes::{ConsensusVote, VoteLedger, VoteOutcome, VoteType};
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Amount, BlockNumber, BlockRef};
use chain_crypto::{Address, Hash, Hashable, Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};

/// External collaborators handed to the engine at construction
pub struct EngineContext {
    pub signer: Arc<dyn Signer>,
    pub supply: Arc<dyn TokenSupply>,
    pub execution: Arc<dyn ExecutionLayer>,
    pub transport: Arc<dyn VoteTransport>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<dyn ConsensusEvents>,
    /// Votes delivered by the transport layer
    pub votes_rx: mpsc::Receiver<ConsensusVote>,
}

/// Quorum state of one height, as exposed to read-only queries
#[derive(Debug, Clone)]
pub struct QuorumStatus {
    pub height: BlockNumber,
    pub voted_power: Amount,
    pub total_power: Amount,
    pub reached: bool,
}

/// Handle that aborts the engine's current height and stops the run loop
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Read-only view over the engine's shared state; usable while the run
/// loop owns the engine
#[derive(Clone)]
pub struct EngineQueries {
    registry: Arc<RwLock<ValidatorRegistry>>,
    ledger: Arc<RwLock<VoteLedger>>,
    slashing: Arc<RwLock<SlashLedger>>,
    clock: Arc<dyn Clock>,
}

impl EngineQueries {
    pub async fn get_validator(&self, address: &Address) -> Option<Validator> {
        self.registry.read().await.get(address)
    }

    pub async fn list_active(&self) -> ActiveSet {
        self.registry.read().await.snapshot_active()
    }

    pub async fn get_parameters(&self) -> ConsensusParams {
        self.registry.read().await.params().clone()
    }

    pub async fn get_quorum_status(&self, height: BlockNumber) -> QuorumStatus {
        let now = self.clock.unix_time();
        let (active, params) = {
            let registry = self.registry.read().await;
            (registry.snapshot_active(), registry.params().clone())
        };
        let mut ledger = self.ledger.write().await;
        let (voted_power, total_power) = ledger.tally(height, &active, &params, now);
        let reached = crate::votes::meets_threshold(&voted_power, &total_power);
        QuorumStatus {
            height,
            voted_power,
            total_power,
            reached,
        }
    }

    pub async fn slash_history(&self) -> Vec<crate::slashing::SlashEvent> {
        self.slashing.read().await.history().to_vec()
    }

    /// Stake-concentration metrics over the current active set:
    /// (nakamoto coefficient, gini coefficient)
    pub async fn stake_distribution(&self) -> (usize, f64) {
        let active = self.registry.read().await.snapshot_active();
        (
            StakeDistribution::nakamoto_coefficient(&active),
            StakeDistribution::gini_coefficient(&active),
        )
    }
}

enum HeightOutcome {
    Finalized(Hash),
    /// Active set dropped below the minimum mid-height
    Halted,
    Shutdown,
}

/// Drives the per-height consensus flow: elect, propose, collect votes,
/// finalize, reward, advance.
///
/// One engine instance is the node's single consensus task; votes arrive
/// from transport threads over the context channel and all shared state
/// sits behind read-write locks that are never held across signature
/// verification or I/O.
pub struct ConsensusEngine {
    registry: Arc<RwLock<ValidatorRegistry>>,
    ledger: Arc<RwLock<VoteLedger>>,
    slashing: Arc<RwLock<SlashLedger>>,
    governance: Arc<RwLock<GovernanceQueue>>,
    rewards: RewardAccountant,
    elector: ProposerElector,
    local_address: Address,

    signer: Arc<dyn Signer>,
    supply: Arc<dyn TokenSupply>,
    execution: Arc<dyn ExecutionLayer>,
    transport: Arc<dyn VoteTransport>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn ConsensusEvents>,

    votes_rx: mpsc::Receiver<ConsensusVote>,
    shutdown_rx: watch::Receiver<bool>,

    prev_block_hash: Option<Hash>,
    halt_reported: bool,
}

impl ConsensusEngine {
    /// Build an engine over an existing registry. Returns the engine and
    /// the shutdown handle for the host to keep.
    pub fn new(
        registry: ValidatorRegistry,
        ctx: EngineContext,
    ) -> (Self, ShutdownHandle) {
        let chain_id = registry.params().chain_id;
        let local_address = ctx.signer.public_key().to_address();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let engine = Self {
            registry: Arc::new(RwLock::new(registry)),
            ledger: Arc::new(RwLock::new(VoteLedger::new())),
            slashing: Arc::new(RwLock::new(SlashLedger::new())),
            governance: Arc::new(RwLock::new(GovernanceQueue::new())),
            rewards: RewardAccountant::new(),
            elector: ProposerElector::new(chain_id),
            local_address,
            signer: ctx.signer,
            supply: ctx.supply,
            execution: ctx.execution,
            transport: ctx.transport,
            clock: ctx.clock,
            events: ctx.events,
            votes_rx: ctx.votes_rx,
            shutdown_rx,
            prev_block_hash: None,
            halt_reported: false,
        };
        let handle = ShutdownHandle {
            tx: Arc::new(shutdown_tx),
        };
        (engine, handle)
    }

    /// Address this node signs with
    pub fn local_address(&self) -> Address {
        self.local_address
    }

    /// Read-only view for RPC-style queries
    pub fn queries(&self) -> EngineQueries {
        EngineQueries {
            registry: Arc::clone(&self.registry),
            ledger: Arc::clone(&self.ledger),
            slashing: Arc::clone(&self.slashing),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Submit a governance diff; it applies at the next epoch boundary
    pub async fn submit_governance_diff(&self, diff: GovernanceDiff) -> ConsensusResult<()> {
        let registry = self.registry.read().await;
        self.governance.write().await.enqueue(diff, &registry)
    }

    /// Shared registry handle for host wiring (staking RPC and the like)
    pub fn registry(&self) -> Arc<RwLock<ValidatorRegistry>> {
        Arc::clone(&self.registry)
    }

    // ==================== STAKING SURFACE ====================

    /// Register a validator with its bonded self stake
    pub async fn register_validator(
        &self,
        address: Address,
        public_key: chain_crypto::PublicKey,
        self_stake: Amount,
        commission: f64,
    ) -> ConsensusResult<()> {
        let now = self.clock.unix_time();
        self.registry
            .write()
            .await
            .register(address, public_key, self_stake, commission, now)
    }

    /// Delegate stake to an active validator
    pub async fn delegate(
        &self,
        delegator: Address,
        validator: Address,
        amount: Amount,
    ) -> ConsensusResult<()> {
        let now = self.clock.unix_time();
        self.registry
            .write()
            .await
            .delegate(delegator, validator, amount, now)
    }

    /// Withdraw delegated stake. The unbond callback fires once the write
    /// lock is released; the host enforces the funds lock until
    /// `release_at`.
    pub async fn undelegate(
        &self,
        delegator: Address,
        validator: Address,
        amount: Amount,
    ) -> ConsensusResult<crate::registry::UnbondNotice> {
        let now = self.clock.unix_time();
        let notice = {
            self.registry
                .write()
                .await
                .undelegate(delegator, validator, amount, now)
        }?;
        self.events
            .on_unbond(&notice.delegator, &notice.validator, &notice.amount);
        Ok(notice)
    }

    /// Operator-triggered unjail; succeeds once the suspension has lapsed
    /// and the stake still clears the floor
    pub async fn request_unjail(&self, validator: &Address) -> ConsensusResult<bool> {
        let now = self.clock.unix_time();
        self.registry.write().await.request_unjail(validator, now)
    }

    /// Drive consensus from `start_height` until shutdown.
    ///
    /// When the active set is below the minimum the halt is reported once
    /// and the loop idles, polling for recovery; no block is produced.
    pub async fn run(&mut self, start_height: BlockNumber) -> ConsensusResult<()> {
        let mut height = start_height;
        tracing::info!("consensus engine starting at height {}", height);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let (active, params) = {
                let registry = self.registry.read().await;
                (registry.snapshot_active(), registry.params().clone())
            };

            if active.len() < params.min_validators {
                if !self.halt_reported {
                    tracing::error!(
                        "consensus halted: {}",
                        ConsensusError::BelowMinValidators {
                            active: active.len(),
                            min: params.min_validators,
                        }
                    );
                    self.halt_reported = true;
                }
                if self.idle_tick(params.block_time_secs).await {
                    break;
                }
                continue;
            }
            self.halt_reported = false;

            match self.run_height(height).await {
                Ok(HeightOutcome::Finalized(hash)) => {
                    self.prev_block_hash = Some(hash);
                    height += 1;
                }
                Ok(HeightOutcome::Halted) => {}
                Ok(HeightOutcome::Shutdown) => break,
                Err(e) => {
                    // External-interface failure: the height is aborted and
                    // retried after a block-time backoff
                    tracing::error!("height {} aborted: {}", height, e);
                    if self.idle_tick(params.block_time_secs).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("consensus engine stopped at height {}", height);
        Ok(())
    }

    /// Sleep one interval, still draining shutdown; returns true on shutdown
    async fn idle_tick(&mut self, secs: u64) -> bool {
        tokio::select! {
            _ = self.shutdown_rx.changed() => true,
            _ = tokio::time::sleep(Duration::from_secs(secs)) => false,
        }
    }

    async fn run_height(&mut self, height: BlockNumber) -> ConsensusResult<HeightOutcome> {
        let mut round = 0u64;

        loop {
            let (active, params) = {
                let registry = self.registry.read().await;
                (registry.snapshot_active(), registry.params().clone())
            };
            if active.len() < params.min_validators {
                // Let the outer loop report the halt
                return Ok(HeightOutcome::Halted);
            }

            let epoch = height / params.epoch_blocks;
            let proposer = self.elector.next_proposer(
                height,
                epoch,
                &active,
                self.prev_block_hash.as_ref(),
                round,
            )?;
            tracing::debug!(
                "height {} round {}: proposer {}",
                height,
                round,
                proposer.to_hex()
            );

            let mut proposal: Option<BlockRef> = None;
            if proposer == self.local_address {
                match self.propose(height, &params).await {
                    Ok(block) => proposal = Some(block),
                    Err(e) => {
                        tracing::error!("local proposal at height {} failed: {}", height, e);
                        self.record_miss(&proposer).await;
                        round += 1;
                        continue;
                    }
                }
            }

            let deadline = tokio::time::Instant::now()
                + Duration::from_secs(params.proposal_timeout_secs);
            let mut poll =
                tokio::time::interval(Duration::from_secs(params.quorum_poll_secs()));
            poll.tick().await; // first tick completes immediately

            let timed_out = loop {
                if let Some(block) = proposal.clone() {
                    if self.check_quorum(height).await {
                        if let Err(e) = self.finalize(height, &block, &proposer).await {
                            // The height is aborted; a local proposer takes
                            // the missed block
                            if proposer == self.local_address {
                                self.record_miss(&self.local_address).await;
                            }
                            return Err(e);
                        }
                        return Ok(HeightOutcome::Finalized(block.hash));
                    }
                }

                tokio::select! {
                    _ = self.shutdown_rx.changed() => return Ok(HeightOutcome::Shutdown),
                    incoming = self.votes_rx.recv() => match incoming {
                        Some(vote) => {
                            self.handle_vote(vote, height, &proposer, &mut proposal).await;
                        }
                        None => return Ok(HeightOutcome::Shutdown),
                    },
                    _ = poll.tick() => {}
                    _ = tokio::time::sleep_until(deadline) => break true,
                }
            };

            if timed_out {
                tracing::warn!(
                    "height {} round {}: no quorum within {}s, proposer {} missed",
                    height,
                    round,
                    params.proposal_timeout_secs,
                    proposer.to_hex()
                );
                self.record_miss(&proposer).await;
                round += 1;
            }
        }
    }

    /// Build, sign and broadcast the local proposal
    async fn propose(
        &self,
        height: BlockNumber,
        params: &ConsensusParams,
    ) -> ConsensusResult<BlockRef> {
        let block = self
            .execution
            .build_block(height, &self.local_address)
            .await
            .map_err(|e| ConsensusError::SignerFailure(e.to_string()))?;

        // Seal the block itself, then endorse it with the Proposal vote;
        // the sealed block travels with the body on the external transport
        let block_signature = tokio::time::timeout(
            Duration::from_secs(params.block_time_secs),
            self.signer.sign(&block.signing_bytes()),
        )
        .await
        .map_err(|_| ConsensusError::SignerFailure("signer timed out".into()))?
        .map_err(|e| ConsensusError::SignerFailure(e.to_string()))?;
        self.execution
            .seal_block(&block, &block_signature)
            .await
            .map_err(|e| ConsensusError::SignerFailure(e.to_string()))?;

        let vote = self
            .sign_vote(block.hash, height, VoteType::Proposal, params)
            .await?;

        self.submit_own_vote(vote.clone()).await;
        if let Err(e) = self.transport.broadcast_vote(&vote).await {
            tracing::warn!("proposal broadcast failed: {}", e);
        }
        self.events
            .on_proposal_created(height, &block.hash, &self.local_address);

        tracing::info!("proposed block {} at height {}", block.hash, height);
        Ok(block)
    }

    /// Sign a vote through the signer abstraction, bounded by one block time
    async fn sign_vote(
        &self,
        block_hash: Hash,
        height: BlockNumber,
        vote_type: VoteType,
        params: &ConsensusParams,
    ) -> ConsensusResult<ConsensusVote> {
        let timestamp = self.clock.unix_time();
        let bytes = ConsensusVote::signing_bytes(&block_hash, height, vote_type, timestamp);

        let signature = tokio::time::timeout(
            Duration::from_secs(params.block_time_secs),
            self.signer.sign(&bytes),
        )
        .await
        .map_err(|_| ConsensusError::SignerFailure("signer timed out".into()))?
        .map_err(|e| ConsensusError::SignerFailure(e.to_string()))?;

        Ok(ConsensusVote {
            validator: self.local_address,
            block_hash,
            block_height: height,
            vote_type,
            timestamp,
            signature,
            public_key: self.signer.public_key().clone(),
        })
    }

    /// Record one of our own votes; local votes go through the same
    /// validation as remote ones
    async fn submit_own_vote(&self, vote: ConsensusVote) {
        let now = self.clock.unix_time();
        let (active, params) = {
            let registry = self.registry.read().await;
            (registry.snapshot_active(), registry.params().clone())
        };
        let outcome = self
            .ledger
            .write()
            .await
            .submit(vote.clone(), &active, &params, now);
        match outcome {
            Ok(VoteOutcome::Accepted) => self.events.on_vote_cast(&vote),
            Ok(_) => {}
            Err(e) => tracing::warn!("own vote rejected: {}", e),
        }
    }

    /// Process one incoming vote: record it, react to proposals, and turn
    /// equivocation evidence into a slash
    async fn handle_vote(
        &self,
        vote: ConsensusVote,
        height: BlockNumber,
        expected_proposer: &Address,
        proposal: &mut Option<BlockRef>,
    ) {
        let now = self.clock.unix_time();
        let (active, params) = {
            let registry = self.registry.read().await;
            (registry.snapshot_active(), registry.params().clone())
        };

        let outcome = self
            .ledger
            .write()
            .await
            .submit(vote.clone(), &active, &params, now);

        match outcome {
            Ok(VoteOutcome::Accepted) => {
                self.events.on_vote_cast(&vote);

                let is_proposal = vote.vote_type == VoteType::Proposal
                    && vote.block_height == height
                    && vote.validator == *expected_proposer;
                if is_proposal && proposal.is_none() {
                    let block =
                        BlockRef::new(vote.block_hash, height, vote.validator, vote.timestamp);
                    match self.execution.validate_block(&block).await {
                        Ok(()) => {
                            *proposal = Some(block);
                            if active.contains(&self.local_address)
                                && self.local_address != *expected_proposer
                            {
                                self.cast_commit(height, vote.block_hash, &params).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                "invalid proposal at height {} from {}: {}",
                                height,
                                vote.validator.to_hex(),
                                e
                            );
                            self.punish(
                                vote.validator,
                                SlashReason::InvalidProposal,
                                Some(vote.block_hash),
                            )
                            .await;
                        }
                    }
                }
            }
            Ok(VoteOutcome::AlreadyRecorded) => {}
            Ok(VoteOutcome::Equivocation(evidence)) => {
                let evidence_hash = {
                    let mut bytes = evidence.first.canonical_bytes();
                    bytes.extend_from_slice(&evidence.second.canonical_bytes());
                    bytes.hash()
                };
                self.punish(evidence.validator, SlashReason::Equivocation, Some(evidence_hash))
                    .await;
            }
            Err(e) => {
                // Per-vote failures are recorded and suppressed
                tracing::debug!("vote rejected: {}", e);
            }
        }
    }

    /// Verify-and-commit step for a valid proposal
    async fn cast_commit(&self, height: BlockNumber, block_hash: Hash, params: &ConsensusParams) {
        match self.sign_vote(block_hash, height, VoteType::Commit, params).await {
            Ok(vote) => {
                self.submit_own_vote(vote.clone()).await;
                if let Err(e) = self.transport.broadcast_vote(&vote).await {
                    tracing::warn!("commit broadcast failed: {}", e);
                }
            }
            Err(e) => tracing::error!("commit signing failed at height {}: {}", height, e),
        }
    }

    async fn check_quorum(&self, height: BlockNumber) -> bool {
        let now = self.clock.unix_time();
        let (active, params) = {
            let registry = self.registry.read().await;
            (registry.snapshot_active(), registry.params().clone())
        };
        self.ledger
            .write()
            .await
            .has_quorum(height, &active, &params, now)
    }

    /// Execute the slash transition and fire the callback outside the locks
    async fn punish(&self, validator: Address, reason: SlashReason, evidence: Option<Hash>) {
        let now = self.clock.unix_time();
        let result = {
            let mut registry = self.registry.write().await;
            let mut slashing = self.slashing.write().await;
            slashing.slash(&mut registry, &validator, reason, evidence, now)
        };
        match result {
            Ok(event) => self.events.on_slash(&validator, reason, &event.amount),
            Err(e) => tracing::warn!("slash of {} failed: {}", validator.to_hex(), e),
        }
    }

    /// Record a missed block for the scheduled proposer; fires the jail
    /// callback when the miss crosses the threshold
    async fn record_miss(&self, proposer: &Address) {
        let now = self.clock.unix_time();
        let notice = {
            let mut registry = self.registry.write().await;
            registry.record_missed(proposer, now)
        };
        match notice {
            Ok(Some(notice)) => self.events.on_jail(&notice.validator, notice.jailed_until),
            Ok(None) => {}
            Err(e) => tracing::warn!("missed-block record failed: {}", e),
        }
    }

    /// Finalize a height: performance, reward, pruning, epoch processing
    async fn finalize(
        &mut self,
        height: BlockNumber,
        block: &BlockRef,
        proposer: &Address,
    ) -> ConsensusResult<()> {
        let now = self.clock.unix_time();

        let (proposer_record, delegations, params) = {
            let mut registry = self.registry.write().await;
            let ledger = self.ledger.read().await;
            let active = registry.snapshot_active();
            let participants = ledger.participants(height, &active);
            registry.update_performance_on_finalize(proposer, &participants, now);
            (
                registry
                    .get(proposer)
                    .ok_or(ConsensusError::NotFound(*proposer))?,
                registry.delegations_of(proposer),
                registry.params().clone(),
            )
        };

        let fees = self
            .execution
            .block_fees(block)
            .await
            .map_err(|e| ConsensusError::MintFailure(e.to_string()))?;

        self.rewards
            .on_finalize(
                self.supply.as_ref(),
                &proposer_record,
                &delegations,
                &params.block_reward,
                fees,
                params.distribute_to_delegators,
            )
            .await?;

        self.ledger.write().await.prune_below(height, &params);

        if (height + 1) % params.epoch_blocks == 0 {
            self.process_epoch_transition(height, &params).await;
        }

        self.events.on_block_finalized(height, &block.hash, proposer);
        tracing::info!(
            "finalized height {} block {} proposer {}",
            height,
            block.hash,
            proposer.to_hex()
        );
        Ok(())
    }

    /// Epoch boundary: complete unbondings, apply queued governance diffs
    async fn process_epoch_transition(&self, height: BlockNumber, params: &ConsensusParams) {
        let now = self.clock.unix_time();
        let notices = {
            let mut registry = self.registry.write().await;
            let completed = registry.process_unbonding(now);
            if !completed.is_empty() {
                tracing::info!("{} validators completed unbonding", completed.len());
            }
            self.governance.write().await.apply_pending(&mut registry, now)
        };
        for notice in notices {
            self.events
                .on_unbond(&notice.delegator, &notice.validator, &notice.amount);
        }
        tracing::info!(
            "epoch {} begins after block {}",
            (height + 1) / params.epoch_blocks,
            height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::SystemClock;
    use async_trait::async_trait;
    use chain_crypto::{InMemorySigner, KeyPair, Signature, SignatureAlgorithm};
    use std::sync::Mutex;

    struct StubExecution;

    #[async_trait]
    impl ExecutionLayer for StubExecution {
        async fn build_block(
            &self,
            height: BlockNumber,
            proposer: &Address,
        ) -> anyhow::Result<BlockRef> {
            Ok(BlockRef::new(Hash::zero(), height, *proposer, 0))
        }

        async fn seal_block(&self, _block: &BlockRef, _sig: &Signature) -> anyhow::Result<()> {
            Ok(())
        }

        async fn validate_block(&self, _block: &BlockRef) -> anyhow::Result<()> {
            Ok(())
        }

        async fn block_fees(&self, _block: &BlockRef) -> anyhow::Result<Amount> {
            Ok(Amount::zero())
        }

        async fn current_height(&self) -> anyhow::Result<BlockNumber> {
            Ok(0)
        }
    }

    struct StubSupply;

    #[async_trait]
    impl TokenSupply for StubSupply {
        async fn mint(&self, _recipient: &Address, _amount: &Amount) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct StubTransport;

    #[async_trait]
    impl VoteTransport for StubTransport {
        async fn broadcast_vote(&self, _vote: &ConsensusVote) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct UnbondRecorder {
        unbonds: Mutex<Vec<(Address, Amount)>>,
    }

    impl ConsensusEvents for UnbondRecorder {
        fn on_unbond(&self, _delegator: &Address, validator: &Address, amount: &Amount) {
            self.unbonds.lock().unwrap().push((*validator, amount.clone()));
        }
    }

    fn build_engine(events: Arc<dyn ConsensusEvents>) -> (ConsensusEngine, ShutdownHandle) {
        let params = ConsensusParams {
            min_stake: Amount::from_u64(1_000),
            ..Default::default()
        };
        let registry = ValidatorRegistry::new(params);
        let signer = Arc::new(InMemorySigner::generate(SignatureAlgorithm::Dilithium).unwrap());
        let (_votes_tx, votes_rx) = mpsc::channel(8);

        ConsensusEngine::new(
            registry,
            EngineContext {
                signer,
                supply: Arc::new(StubSupply),
                execution: Arc::new(StubExecution),
                transport: Arc::new(StubTransport),
                clock: Arc::new(SystemClock),
                events,
                votes_rx,
            },
        )
    }

    #[tokio::test]
    async fn test_staking_surface() {
        let recorder = Arc::new(UnbondRecorder::default());
        let (engine, _shutdown) = build_engine(recorder.clone());
        let queries = engine.queries();

        let keypair = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        let validator = keypair.public_key().to_address();
        engine
            .register_validator(
                validator,
                keypair.public_key().clone(),
                Amount::from_u64(5_000),
                0.1,
            )
            .await
            .unwrap();

        let delegator = Address::new([3u8; 20]);
        engine
            .delegate(delegator, validator, Amount::from_u64(2_000))
            .await
            .unwrap();
        assert_eq!(
            queries.get_validator(&validator).await.unwrap().total_stake(),
            Amount::from_u64(7_000)
        );

        let notice = engine
            .undelegate(delegator, validator, Amount::from_u64(500))
            .await
            .unwrap();
        assert_eq!(notice.amount, Amount::from_u64(500));

        let unbonds = recorder.unbonds.lock().unwrap();
        assert_eq!(unbonds.len(), 1);
        assert_eq!(unbonds[0], (validator, Amount::from_u64(500)));
    }

    #[tokio::test]
    async fn test_queries_view() {
        let (engine, _shutdown) = build_engine(Arc::new(crate::events::NoopEvents));
        let queries = engine.queries();

        assert!(queries.list_active().await.is_empty());
        assert_eq!(queries.get_parameters().await.max_validators, 21);

        let status = queries.get_quorum_status(1).await;
        assert!(!status.reached);
        assert!(status.voted_power.is_zero());
        assert!(queries.slash_history().await.is_empty());

        let (nakamoto, gini) = queries.stake_distribution().await;
        assert_eq!(nakamoto, 0);
        assert_eq!(gini, 0.0);
    }
}
