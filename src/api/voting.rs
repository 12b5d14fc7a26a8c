use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    api::{
        auth::AuthToken,
        ballot::BallotDescription,
        eligibility::EligibilityStatus,
        receipt::{VoteReceipt, VoteRequest},
    },
    common::VoteToken,
    db::voter::Voter,
    mongodb::Id,
};
use crate::voting::VotingBooth;

pub fn routes() -> Vec<Route> {
    routes![eligibility, ballot, cast_vote]
}

#[get("/voter/elections/<election_id>/eligibility")]
async fn eligibility(
    token: AuthToken<Voter>,
    election_id: Id,
    booth: &State<VotingBooth>,
) -> Result<Json<EligibilityStatus>> {
    let status = booth
        .check_eligibility(token.account_id, election_id)
        .await?;
    Ok(Json(status.into()))
}

#[get("/voter/elections/<election_id>/ballot")]
async fn ballot(
    token: AuthToken<Voter>,
    election_id: Id,
    booth: &State<VotingBooth>,
) -> Result<Json<BallotDescription>> {
    let ballot = booth.ballot(token.account_id, election_id).await?;
    Ok(Json(ballot.into()))
}

#[post("/voter/elections/<election_id>/vote", data = "<request>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: Id,
    request: Json<VoteRequest>,
    booth: &State<VotingBooth>,
    request_id: &RequestId,
) -> Result<Json<VoteReceipt>> {
    // The token is always ours, never the client's.
    let outcome = booth
        .commit_vote(
            token.account_id,
            election_id,
            *request.candidate_id,
            VoteToken::generate(),
        )
        .await;
    debug!("{request_id} vote outcome: {outcome:?}");

    let vote = outcome.into_result()?;
    Ok(Json(vote.into()))
}
