use alloy::primitives::{Address, address};

alloy::sol! {
    #[sol(rpc)]
    interface ISafe {
        function VERSION() external view returns (string memory);
        function isModuleEnabled(address module) external view returns (bool);
        function setup(
            address[] calldata _owners,
            uint256 _threshold,
            address to,
            bytes calldata data,
            address fallbackHandler,
            address paymentToken,
            uint256 payment,
            address payable paymentReceiver
        ) external;
    }

    #[sol(rpc)]
    interface ISafe4337Module {
        function SUPPORTED_ENTRYPOINT() external view returns (address);
        function executeUserOp(address to, uint256 value, bytes calldata data, uint8 operation) external;
        /// Same as `executeUserOp`, but bubbles the revert string so bundler simulations
        /// return a useful reason instead of the generic `ExecutionFailed()`.
        function executeUserOpWithErrorString(address to, uint256 value, bytes calldata data, uint8 operation) external;
    }

    #[sol(rpc)]
    interface ISafeProxyFactory {
        function createProxyWithNonce(address _singleton, bytes memory initializer, uint256 saltNonce) external returns (address proxy);
        function proxyCreationCode() external pure returns (bytes memory);
    }

    #[sol(rpc)]
    interface ISafeModuleSetup {
        function enableModules(address[] calldata modules) external;
    }

    /// Packed encoding per entry: operation (1) | to (20) | value (32) | data length (32) | data.
    #[sol(rpc)]
    interface IMultiSend {
        function multiSend(bytes memory transactions) external payable;
    }

    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IEntryPointNonces {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    #[sol(rpc)]
    interface ISafeWebAuthnSharedSigner {
        /// P-256 public key plus the packed verifier selector (precompile id | fallback verifier).
        struct Signer {
            uint256 x;
            uint256 y;
            uint176 verifiers;
        }

        function configure(Signer calldata signer) external;
    }
}

/// Canonical ERC-4337 entry point v0.6.
pub const ENTRYPOINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");
/// Canonical ERC-4337 entry point v0.7.
pub const ENTRYPOINT_V07: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Safe 4337 module 0.2.0 (pairs with entry point v0.6).
pub const SAFE_4337_MODULE_V02: Address = address!("a581c4A4DB7175302464fF3C06380BC3270b4037");
/// Safe 4337 module 0.3.0 (pairs with entry point v0.7).
pub const SAFE_4337_MODULE_V03: Address = address!("75cf11467937ce3F2f357CE24ffc3DBF8fD5c226");

/// Delegate target used during `setup` to enable modules on a fresh account.
pub const SAFE_MODULE_SETUP: Address = address!("2dd68b007B46fBe91B9A7c3EDa5A7a1063cB5b47");

pub const SAFE_PROXY_FACTORY: Address = address!("4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67");
pub const SAFE_SINGLETON_L2: Address = address!("29fcB43b46531BcA003ddC8FCB67FFE91900C762");
pub const MULTI_SEND: Address = address!("38869bf66a61cF6bDB996A6aE40D5853Fd43B526");

/// Shared WebAuthn signer contract that represents passkey owners on-chain.
pub const WEBAUTHN_SHARED_SIGNER: Address = address!("94a4F6affBd8975951142c3999aEAB7ecee555c2");

/// Fallback P-256 signature verifier used when the chain has no RIP-7212 precompile.
pub const P256_VERIFIER: Address = address!("A86e0054C51E4894D88762a017ECc5E5235f5DBA");

/// EIP-1967-style slot holding the Safe's fallback handler
/// (`keccak256("fallback_manager.handler.address")`).
pub const FALLBACK_HANDLER_SLOT: [u8; 32] = [
    0x6c, 0x9a, 0x6c, 0x4a, 0x39, 0x28, 0x4e, 0x37, 0xed, 0x1c, 0xf5, 0x3d, 0x33, 0x75, 0x77, 0xd1,
    0x42, 0x12, 0xa4, 0x87, 0x0f, 0xb9, 0x76, 0xa4, 0x36, 0x6c, 0x69, 0x3b, 0x93, 0x99, 0x18, 0xd5,
];
