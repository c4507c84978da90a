//! `FinalizerVoteService`: the default `FinalizerVoteApi` implementation,
//! a thin async wrapper over [`FinalizerSet`].

use std::collections::HashMap;

use async_trait::async_trait;
use shared_types::BlsPublicKeyBytes;

use crate::domain::{CastVote, FinalizerSet, QcObservation, VoteInput};
use crate::error::FinalityResult;
use crate::ports::inbound::FinalizerVoteApi;

pub struct FinalizerVoteService {
    finalizers: FinalizerSet,
}

impl FinalizerVoteService {
    pub fn new(finalizers: FinalizerSet) -> Self {
        FinalizerVoteService { finalizers }
    }
}

#[async_trait]
impl FinalizerVoteApi for FinalizerVoteService {
    async fn decide_votes(&self, inputs: HashMap<BlsPublicKeyBytes, VoteInput>) -> FinalityResult<Vec<CastVote>> {
        self.finalizers.decide_for_block(&inputs)
    }

    async fn observe_qc(&self, observation: QcObservation) -> FinalityResult<bool> {
        self.finalizers.observe_qc(observation)
    }
}
