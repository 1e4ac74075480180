//! Solidity interfaces of the router and the CREATE2 factory

use alloy_sol_types::sol;

sol! {
    /// A router table row as the router stores it
    #[derive(Debug, PartialEq, Eq)]
    struct Router {
        string functionSignature;
        bytes4 functionSelector;
        address routerAddress;
    }

    interface IRouter {
        function addRouter(Router memory router) external;
        function updateRouter(Router memory router) external;
        function removeRouter(bytes4 selector, string calldata functionSignature) external;
        function getAllFunctionsOfRouter(address routerAddress) external view returns (bytes4[] memory);
        function getAllRouters() external view returns (Router[] memory);
        function multicall(bytes[] calldata data) external returns (bytes[] memory results);
    }

    interface ICreate2Factory {
        function deploy(bytes memory initCode, bytes32 salt) external returns (address createdContract);
    }
}
