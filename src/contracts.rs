//! Centralized Contract Definitions
//!
//! Solidity contract interfaces needed by the detection engine, defined
//! using alloy's `sol!` macro. Each interface is annotated with
//! `#[sol(rpc)]` to generate contract instance types that can make RPC
//! calls via any alloy Provider.
//!
//! Author: AI-Generated
//! Created: 2026-02-01
//! Modified: 2026-07-28 — trimmed to the constant-product-only scope of the
//! detection engine; router/quoter/V3/Algebra/execution interfaces dropped
//! (see DESIGN.md).

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
    }
}

// ── Uniswap V2 (and forks) ───────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }
}

sol! {
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}
