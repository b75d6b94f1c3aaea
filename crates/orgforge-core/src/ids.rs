use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "John", "Patricia", "Robert", "Jennifer", "Michael", "Linda", "William",
    "Elizabeth", "David", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
    "Charles", "Karen", "Christopher", "Nancy", "Daniel", "Lisa", "Matthew", "Betty", "Anthony",
    "Margaret", "Mark", "Sandra", "Donald", "Ashley", "Steven", "Kimberly", "Paul", "Emily",
    "Andrew", "Donna", "Joshua", "Michelle", "Kenneth", "Carol",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson", "White", "Harris", "Sanchez",
    "Clark", "Ramirez", "Lewis", "Robinson", "Walker", "Young", "Allen", "King", "Wright", "Scott",
    "Torres", "Nguyen", "Hill", "Flores", "Green",
];

const TEAM_NAMES: &[&str] = &[
    "Platform", "Payments", "Growth", "Search", "Identity", "Mobile", "Data", "Infrastructure",
    "Checkout", "Messaging", "Billing", "Analytics", "Onboarding", "Reliability", "Storage",
    "Developer Tools", "Integrations", "Notifications", "Security", "Frontend Core",
];

const INITIALS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Person,
    Team,
    Ticket,
    FixVersion,
    Sprint,
    Event,
}

/// Run-scoped identity state: ID counters, issued names, and the seeded RNG.
///
/// One per run. Nothing here is global, so two runs with the same seed and
/// config produce the same graph.
#[derive(Debug)]
pub struct RunContext {
    seed: u64,
    project_key: String,
    counters: HashMap<IdKind, u32>,
    names: HashSet<String>,
    team_names: HashSet<String>,
    rng: StdRng,
}

impl RunContext {
    pub fn new(seed: u64, project_key: impl Into<String>) -> Self {
        Self {
            seed,
            project_key: project_key.into(),
            counters: HashMap::new(),
            names: HashSet::new(),
            team_names: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Forget every issued ID and name and reseed.
    pub fn reset(&mut self, seed: u64) {
        self.seed = seed;
        self.counters.clear();
        self.names.clear();
        self.team_names.clear();
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    pub fn reserve_id(&mut self, kind: IdKind) -> String {
        let n = self.counters.entry(kind).or_insert(0);
        *n += 1;
        let prefix = match kind {
            IdKind::Person => "EMP",
            IdKind::Team => "TEAM",
            IdKind::Ticket => self.project_key.as_str(),
            IdKind::FixVersion => "VER",
            IdKind::Sprint => "SPR",
            IdKind::Event => "EVT",
        };
        format!("{prefix}-{n}")
    }

    /// A `First Last` name not yet issued in this run. Once every pair is
    /// taken, falls back to `First M. Last`, then to a numbered suffix.
    pub fn sample_name(&mut self) -> String {
        let pairs = FIRST_NAMES.len() * LAST_NAMES.len();
        let start = self.rng.gen_range(0..pairs);
        for i in 0..pairs {
            let idx = (start + i) % pairs;
            let name = format!(
                "{} {}",
                FIRST_NAMES[idx % FIRST_NAMES.len()],
                LAST_NAMES[idx / FIRST_NAMES.len()]
            );
            if self.names.insert(name.clone()) {
                return name;
            }
        }

        let with_initial = pairs * INITIALS.len();
        let start = self.rng.gen_range(0..with_initial);
        for i in 0..with_initial {
            let idx = (start + i) % with_initial;
            let pair = idx % pairs;
            let initial = INITIALS[idx / pairs] as char;
            let name = format!(
                "{} {initial}. {}",
                FIRST_NAMES[pair % FIRST_NAMES.len()],
                LAST_NAMES[pair / FIRST_NAMES.len()]
            );
            if self.names.insert(name.clone()) {
                return name;
            }
        }

        let mut n = self.names.len();
        loop {
            n += 1;
            let name = format!(
                "{} {} {n}",
                FIRST_NAMES[n % FIRST_NAMES.len()],
                LAST_NAMES[n % LAST_NAMES.len()]
            );
            if self.names.insert(name.clone()) {
                return name;
            }
        }
    }

    pub fn sample_team_name(&mut self) -> String {
        let start = self.rng.gen_range(0..TEAM_NAMES.len());
        for i in 0..TEAM_NAMES.len() {
            let name = TEAM_NAMES[(start + i) % TEAM_NAMES.len()].to_string();
            if self.team_names.insert(name.clone()) {
                return name;
            }
        }
        let mut n = 1;
        loop {
            n += 1;
            let name = format!("{} {n}", TEAM_NAMES[start]);
            if self.team_names.insert(name.clone()) {
                return name;
            }
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// `Mary K. Smith` at `acme.test` → `mary.k.smith@acme.test`.
pub fn email_for(name: &str, domain: &str) -> String {
    let local: Vec<String> = name
        .split_whitespace()
        .map(|part| {
            part.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|part| !part.is_empty())
        .collect();
    format!("{}@{domain}", local.join("."))
}

/// `Acme Software` → `acmesoftware.com`.
pub fn domain_for(company_name: &str) -> String {
    let stem: String = company_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if stem.is_empty() {
        "example.com".into()
    } else {
        format!("{stem}.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_per_kind() {
        let mut ctx = RunContext::new(7, "ACME");
        assert_eq!(ctx.reserve_id(IdKind::Person), "EMP-1");
        assert_eq!(ctx.reserve_id(IdKind::Person), "EMP-2");
        assert_eq!(ctx.reserve_id(IdKind::Ticket), "ACME-1");
        assert_eq!(ctx.reserve_id(IdKind::Team), "TEAM-1");
        assert_eq!(ctx.reserve_id(IdKind::Ticket), "ACME-2");
        assert_eq!(ctx.reserve_id(IdKind::Event), "EVT-1");
        assert_eq!(ctx.reserve_id(IdKind::FixVersion), "VER-1");
    }

    #[test]
    fn reset_restarts_counters_and_names() {
        let mut ctx = RunContext::new(1, "P");
        let first = ctx.sample_name();
        ctx.reserve_id(IdKind::Person);
        ctx.reset(1);
        assert_eq!(ctx.reserve_id(IdKind::Person), "EMP-1");
        assert_eq!(ctx.sample_name(), first);
    }

    #[test]
    fn same_seed_same_names() {
        let mut a = RunContext::new(42, "P");
        let mut b = RunContext::new(42, "P");
        for _ in 0..20 {
            assert_eq!(a.sample_name(), b.sample_name());
        }
    }

    #[test]
    fn names_never_collide_past_pool_size() {
        let mut ctx = RunContext::new(3, "P");
        let total = FIRST_NAMES.len() * LAST_NAMES.len() + 50;
        let mut seen = HashSet::new();
        for _ in 0..total {
            assert!(seen.insert(ctx.sample_name()));
        }
        assert!(seen.iter().any(|n| n.contains(". ")));
    }

    #[test]
    fn team_names_unique_past_pool_size() {
        let mut ctx = RunContext::new(3, "P");
        let mut seen = HashSet::new();
        for _ in 0..(TEAM_NAMES.len() + 5) {
            assert!(seen.insert(ctx.sample_team_name()));
        }
    }

    #[test]
    fn email_from_name() {
        assert_eq!(email_for("Mary Smith", "acme.test"), "mary.smith@acme.test");
        assert_eq!(
            email_for("Mary K. Smith", "acme.test"),
            "mary.k.smith@acme.test"
        );
        assert_eq!(domain_for("Acme Software"), "acmesoftware.com");
        assert_eq!(domain_for("!!"), "example.com");
    }
}
