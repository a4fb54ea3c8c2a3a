//! Endpoint sequences of the three traffic scenarios

use crate::protocol::ScenarioId;

/// One authenticated call in a scenario iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointCall {
    /// Logical endpoint name used as the stats key
    pub name: &'static str,
    /// Path appended to the run's base URL
    pub path: &'static str,
}

/// Login endpoint shared by all scenarios
pub const LOGIN: EndpointCall = EndpointCall {
    name: "login",
    path: "/auth/login",
};

/// Second hop for targets that answer login with a password to exchange
pub const TOKEN_EXCHANGE: EndpointCall = EndpointCall {
    name: "token_exchange",
    path: "/auth/token",
};

/// Start a game session, read the balance, read the leaderboard
const SCENARIO_A: &[EndpointCall] = &[
    EndpointCall {
        name: "game_start",
        path: "/game/session/start",
    },
    EndpointCall {
        name: "wallet_balance",
        path: "/wallet/balance",
    },
    EndpointCall {
        name: "leaderboard",
        path: "/leaderboard/top",
    },
];

/// Losing-game path that surfaces retry popups
const SCENARIO_B: &[EndpointCall] = &[
    EndpointCall {
        name: "game_start",
        path: "/game/session/start",
    },
    EndpointCall {
        name: "game_fail",
        path: "/game/session/fail",
    },
    EndpointCall {
        name: "popup_retry",
        path: "/popup/retry",
    },
    EndpointCall {
        name: "wallet_balance",
        path: "/wallet/balance",
    },
];

/// Rewards and profile heavy path
const SCENARIO_C: &[EndpointCall] = &[
    EndpointCall {
        name: "rewards_daily",
        path: "/rewards/daily",
    },
    EndpointCall {
        name: "profile",
        path: "/profile/me",
    },
    EndpointCall {
        name: "rewards_history",
        path: "/rewards/history",
    },
];

impl ScenarioId {
    /// Calls made on every iteration, in order
    pub fn steps(&self) -> &'static [EndpointCall] {
        match self {
            ScenarioId::A => SCENARIO_A,
            ScenarioId::B => SCENARIO_B,
            ScenarioId::C => SCENARIO_C,
        }
    }

    /// Requests one user issues when every call succeeds
    pub fn requests_per_user(&self, iterations: u64) -> u64 {
        1 + iterations * self.steps().len() as u64
    }
}
