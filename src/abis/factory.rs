use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IArenaFactory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    event PairCreated(address indexed token0, address indexed token1, address pair, uint256);
}
