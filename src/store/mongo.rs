use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{Acknowledgment, ReadConcern, TransactionOptions, WriteConcern},
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    db::{
        candidate::Candidate,
        election::Election,
        party::Party,
        vote::{NewVote, Vote},
        voter::{Voter, VoterCore},
    },
    mongodb::{is_duplicate_key_error, is_write_conflict, Coll, Id},
};

use super::{VoteStore, VoteTransaction};

/// The production store, backed by a MongoDB replica set.
///
/// At most one vote per voter and election is guaranteed by the unique index
/// on `(voter_id, election_id)` created by
/// [`ensure_indexes_exist`](crate::model::mongodb::ensure_indexes_exist).
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }
}

#[rocket::async_trait]
impl VoteStore for MongoStore {
    async fn voter_for_account(&self, account_id: Id) -> Result<Option<Voter>> {
        let filter = doc! { "account_id": account_id };
        Ok(Coll::<Voter>::from_db(&self.db).find_one(filter, None).await?)
    }

    async fn election(&self, election_id: Id) -> Result<Option<Election>> {
        Ok(Coll::<Election>::from_db(&self.db)
            .find_one(election_id.as_doc(), None)
            .await?)
    }

    async fn candidate(&self, candidate_id: Id) -> Result<Option<Candidate>> {
        Ok(Coll::<Candidate>::from_db(&self.db)
            .find_one(candidate_id.as_doc(), None)
            .await?)
    }

    async fn candidates_in(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let filter = doc! { "election_id": election_id };
        let candidates = Coll::<Candidate>::from_db(&self.db)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn party(&self, party_id: Id) -> Result<Option<Party>> {
        Ok(Coll::<Party>::from_db(&self.db)
            .find_one(party_id.as_doc(), None)
            .await?)
    }

    async fn vote_of(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>> {
        let filter = doc! {
            "voter_id": voter_id,
            "election_id": election_id,
        };
        Ok(Coll::<Vote>::from_db(&self.db).find_one(filter, None).await?)
    }

    async fn begin_vote(&self, voter_id: Id, election_id: Id) -> Result<Box<dyn VoteTransaction>> {
        let mut session = self.client.start_session(None).await?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await?;

        Ok(Box::new(MongoVoteTransaction {
            session,
            votes: Coll::from_db(&self.db),
            voters: Coll::from_db(&self.db),
            voter_id,
            election_id,
        }))
    }
}

/// A vote transaction on a MongoDB session.
///
/// If dropped while the transaction is still in progress, the driver aborts it.
struct MongoVoteTransaction {
    session: ClientSession,
    votes: Coll<NewVote>,
    voters: Coll<Voter>,
    voter_id: Id,
    election_id: Id,
}

#[rocket::async_trait]
impl VoteTransaction for MongoVoteTransaction {
    async fn insert_vote(&mut self, vote: &NewVote) -> Result<Id> {
        let id = self
            .votes
            .insert_one_with_session(vote, None, &mut self.session)
            .await
            .map_err(classify)?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Unexpected("Inserted vote has no ObjectId".to_string()))?;
        Ok(id.into())
    }

    async fn mark_voted(&mut self) -> Result<()> {
        // Only matches if the flag is not yet set, so a second writer finds nothing to update.
        let flag = VoterCore::voted_flag_path(self.election_id);
        let filter = doc! {
            "_id": self.voter_id,
            &flag: { "$ne": true },
        };
        let update = doc! {
            "$set": { &flag: true },
        };
        let result = self
            .voters
            .update_one_with_session(filter, update, None, &mut self.session)
            .await
            .map_err(classify)?;
        if result.matched_count == 0 {
            return Err(Error::Conflict(format!(
                "Voter {} is already marked as voted in election {}",
                self.voter_id, self.election_id
            )));
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.session.commit_transaction().await.map_err(classify)
    }

    async fn abort(mut self: Box<Self>) -> Result<()> {
        Ok(self.session.abort_transaction().await?)
    }
}

/// Sort a database error into the vote protocol's taxonomy.
fn classify(err: DbError) -> Error {
    if is_duplicate_key_error(&err) {
        Error::Conflict("A vote is already recorded for this voter and election".to_string())
    } else if is_write_conflict(&err) {
        Error::TransientFailure(format!("Lost a race with a concurrent transaction: {err}"))
    } else {
        Error::Db(err)
    }
}
