//! Offline cross-check of an exported vote log against the registered
//! voter roster. Runs entirely on local JSON exports; nothing here talks to
//! the backend.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// One exported vote row. `candidate` holds the candidate's display name as
/// written at vote time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVote {
    pub email: String,
    pub candidate: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Candidate registry entry used to group votes by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditCandidate {
    pub id: String,
    pub name: String,
    pub position: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateAudit {
    pub valid_votes: u64,
    pub invalid_votes: u64,
    pub is_winner: bool,
}

/// Expected versus actual participation. `actual_votes` counts one vote per
/// position per valid voter, so it scales with the number of positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Turnout {
    pub registered_voters: u64,
    pub actual_voters: u64,
    pub expected_votes: u64,
    pub actual_votes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    /// Position name to candidate name to tallies.
    pub results: BTreeMap<String, BTreeMap<String, CandidateAudit>>,
    pub total_valid_votes: u64,
    pub total_invalid_votes: u64,
    pub turnout: Turnout,
}

/// A vote is valid iff its email matches a roster entry, compared
/// case-insensitively. Votes naming an unregistered candidate are counted
/// under that name anyway so ballot-stuffing attempts stay visible in the
/// report.
pub fn compare_votes(
    votes: &[RawVote],
    roster: &[String],
    candidates: &[AuditCandidate],
) -> AuditReport {
    let roster_lower: HashSet<String> = roster.iter().map(|e| e.trim().to_lowercase()).collect();

    let mut position_of: BTreeMap<&str, &str> = BTreeMap::new();
    let mut results: BTreeMap<String, BTreeMap<String, CandidateAudit>> = BTreeMap::new();
    for candidate in candidates {
        position_of.insert(candidate.name.as_str(), candidate.position.as_str());
        results
            .entry(candidate.position.clone())
            .or_default()
            .entry(candidate.name.clone())
            .or_default();
    }

    let mut valid_voters: HashSet<String> = HashSet::new();
    let mut total_valid = 0u64;
    let mut total_invalid = 0u64;

    for vote in votes {
        let email = vote.email.trim().to_lowercase();
        let position = vote
            .position
            .as_deref()
            .or_else(|| position_of.get(vote.candidate.as_str()).copied())
            .unwrap_or("Unknown")
            .to_string();
        let entry = results
            .entry(position)
            .or_default()
            .entry(vote.candidate.clone())
            .or_default();

        if roster_lower.contains(&email) {
            entry.valid_votes += 1;
            total_valid += 1;
            valid_voters.insert(email);
        } else {
            entry.invalid_votes += 1;
            total_invalid += 1;
        }
    }

    for tallies in results.values_mut() {
        let top = tallies.values().map(|c| c.valid_votes).max().unwrap_or(0);
        if top == 0 {
            continue;
        }
        for audit in tallies.values_mut() {
            audit.is_winner = audit.valid_votes == top;
        }
    }

    let positions_count = results.len() as u64;
    let registered = roster.len() as u64;
    AuditReport {
        turnout: Turnout {
            registered_voters: registered,
            actual_voters: valid_voters.len() as u64,
            expected_votes: registered * positions_count,
            actual_votes: total_valid,
        },
        total_valid_votes: total_valid,
        total_invalid_votes: total_invalid,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, position: &str) -> AuditCandidate {
        AuditCandidate {
            id: format!("candidate-{name}"),
            name: name.to_string(),
            position: position.to_string(),
        }
    }

    fn vote(email: &str, candidate: &str, position: &str) -> RawVote {
        RawVote {
            email: email.to_string(),
            candidate: candidate.to_string(),
            position: Some(position.to_string()),
            timestamp: None,
        }
    }

    #[test]
    fn validity_matches_roster_case_insensitively() {
        let roster = vec!["ada@school.edu".to_string()];
        let candidates = vec![candidate("Ada Obi", "President")];
        let votes = vec![
            vote("ADA@School.EDU", "Ada Obi", "President"),
            vote("intruder@mail.com", "Ada Obi", "President"),
        ];

        let report = compare_votes(&votes, &roster, &candidates);
        let audit = &report.results["President"]["Ada Obi"];
        assert_eq!(audit.valid_votes, 1);
        assert_eq!(audit.invalid_votes, 1);
        assert_eq!(report.total_valid_votes, 1);
        assert_eq!(report.total_invalid_votes, 1);
    }

    #[test]
    fn winner_flag_ignores_invalid_votes() {
        let roster = vec!["a@school.edu".to_string(), "b@school.edu".to_string()];
        let candidates = vec![
            candidate("Ada Obi", "President"),
            candidate("Bola Tunde", "President"),
        ];
        let votes = vec![
            vote("a@school.edu", "Ada Obi", "President"),
            vote("b@school.edu", "Ada Obi", "President"),
            vote("x@mail.com", "Bola Tunde", "President"),
            vote("y@mail.com", "Bola Tunde", "President"),
            vote("z@mail.com", "Bola Tunde", "President"),
        ];

        let report = compare_votes(&votes, &roster, &candidates);
        assert!(report.results["President"]["Ada Obi"].is_winner);
        assert!(!report.results["President"]["Bola Tunde"].is_winner);
    }

    #[test]
    fn tied_leaders_are_all_winners_and_zero_vote_positions_have_none() {
        let roster = vec!["a@school.edu".to_string(), "b@school.edu".to_string()];
        let candidates = vec![
            candidate("Ada Obi", "President"),
            candidate("Bola Tunde", "President"),
            candidate("Chike Eze", "Treasurer"),
        ];
        let votes = vec![
            vote("a@school.edu", "Ada Obi", "President"),
            vote("b@school.edu", "Bola Tunde", "President"),
        ];

        let report = compare_votes(&votes, &roster, &candidates);
        assert!(report.results["President"]["Ada Obi"].is_winner);
        assert!(report.results["President"]["Bola Tunde"].is_winner);
        assert!(!report.results["Treasurer"]["Chike Eze"].is_winner);
    }

    #[test]
    fn unregistered_candidate_votes_stay_visible() {
        let roster = vec!["a@school.edu".to_string()];
        let candidates = vec![candidate("Ada Obi", "President")];
        let votes = vec![vote("a@school.edu", "Write In", "President")];

        let report = compare_votes(&votes, &roster, &candidates);
        assert_eq!(report.results["President"]["Write In"].valid_votes, 1);
    }

    #[test]
    fn turnout_counts_valid_voters_and_scales_expected_by_positions() {
        let roster = vec![
            "a@school.edu".to_string(),
            "b@school.edu".to_string(),
            "c@school.edu".to_string(),
        ];
        let candidates = vec![
            candidate("Ada Obi", "President"),
            candidate("Chike Eze", "Treasurer"),
        ];
        let votes = vec![
            vote("a@school.edu", "Ada Obi", "President"),
            vote("a@school.edu", "Chike Eze", "Treasurer"),
            vote("stranger@mail.com", "Ada Obi", "President"),
        ];

        let report = compare_votes(&votes, &roster, &candidates);
        assert_eq!(report.turnout.registered_voters, 3);
        assert_eq!(report.turnout.actual_voters, 1);
        assert_eq!(report.turnout.expected_votes, 6);
        assert_eq!(report.turnout.actual_votes, 2);
    }
}
